//! Plain-text rendering of the subscribed views.

use crate::model::Showing;
use crate::subs::Subs;
use refract_runtime::SubscriptionError;
use std::fmt::Write as _;

/// Render the task list as it would appear on screen
///
/// Reads only the signals in `subs`, never the state directly.
///
/// # Errors
///
/// Returns [`SubscriptionError`] if any subscription fails to compute.
pub fn render_text(subs: &Subs) -> Result<String, SubscriptionError> {
    let visible = subs.visible_todos.value()?;
    let all_complete = subs.all_complete.value()?;
    let counts = subs.footer_counts.value()?;
    let showing = subs.showing.value()?;

    let mut out = String::new();
    if counts.active + counts.done > 0 {
        let marker = if *all_complete { "[x]" } else { "[ ]" };
        let _ = writeln!(out, "{marker} Mark all as complete");
    }
    for task in &*visible {
        let marker = if task.done { "[x]" } else { "[ ]" };
        let _ = writeln!(out, "  {marker} {}", task.title);
    }

    let noun = if counts.active == 1 { "item" } else { "items" };
    let _ = write!(out, "{} {noun} left |", counts.active);
    for filter in Showing::ALL {
        if filter == *showing {
            let _ = write!(out, " ({filter})");
        } else {
            let _ = write!(out, " {filter}");
        }
    }
    if counts.done > 0 {
        let _ = write!(out, " | Clear completed ({})", counts.done);
    }
    out.push('\n');
    Ok(out)
}
