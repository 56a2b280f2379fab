//! Select, pin and attend commands: per-type session choices.

use std::io::Write;

use anyhow::Result;

use super::session::PlannerSession;
use super::util::parse_type_code;

pub fn select<W: Write>(
    writer: &mut W,
    session: &mut PlannerSession,
    key: &str,
    code: &str,
    index: Option<usize>,
) -> Result<()> {
    let key = session.saved_key(key)?;
    let code = parse_type_code(code)?;
    session.planner_mut().choose_session(&key, &code, index)?;

    let chosen = session
        .planner()
        .store()
        .get(&key)
        .and_then(|saved| saved.selections.get(&code))
        .filter(|selection| selection.session_index.is_some())
        .map(|selection| selection.session_name.clone());
    match chosen {
        Some(name) => writeln!(writer, "{key} {code}: {name}")?,
        None => writeln!(writer, "{key} {code}: unset")?,
    }
    Ok(())
}

pub fn pin<W: Write>(
    writer: &mut W,
    session: &mut PlannerSession,
    key: &str,
    code: &str,
    index: usize,
) -> Result<()> {
    let key = session.saved_key(key)?;
    let code = parse_type_code(code)?;
    let pinned = session.planner_mut().toggle_pin(&key, &code, index)?;
    let state = if pinned { "pinned" } else { "unpinned" };
    writeln!(writer, "{key} {code}: session {index} {state}")?;
    Ok(())
}

pub fn attend<W: Write>(
    writer: &mut W,
    session: &mut PlannerSession,
    key: &str,
    code: &str,
    attended: bool,
) -> Result<()> {
    let key = session.saved_key(key)?;
    let code = parse_type_code(code)?;
    session.planner_mut().set_attended(&key, &code, attended)?;
    let state = if attended { "attended" } else { "not attended" };
    writeln!(writer, "{key} {code}: {state}")?;
    Ok(())
}
