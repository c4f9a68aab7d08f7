//! Forced history compression.
//!
//! The emergency response to a context overflow: drop the older half of the
//! conversational body, leave a note saying how much went, and keep the
//! first and last messages. Synchronous and lossy; the running summary is
//! not touched.

use chrono::Utc;
use concierge_core::error::Error;
use concierge_core::event::{DomainEvent, EventBus};
use concierge_core::message::{Message, Role};
use concierge_core::session::SessionStore;
use tracing::info;

/// Histories this short are left alone.
pub const MIN_COMPRESSIBLE: usize = 5;

pub fn compression_note(dropped: usize) -> String {
    format!("[Emergency compression dropped {dropped} older messages due to context limits]")
}

/// Compress `history`, returning the new history and how many messages were
/// dropped. `None` when there are four or fewer messages.
///
/// The body is `history[1..len-1]`. Its older `ceil(body/2)` messages are
/// dropped, and the cut moves forward past tool results so the kept window
/// never opens with a result whose call is gone.
pub fn force_compress(history: &[Message]) -> Option<(Vec<Message>, usize)> {
    if history.len() < MIN_COMPRESSIBLE {
        return None;
    }

    let last = history.len() - 1;
    let body = &history[1..last];
    let mut cut = body.len().div_ceil(2);
    while cut < body.len() && body[cut].role == Role::Tool {
        cut += 1;
    }

    let mut compressed = Vec::with_capacity(body.len() - cut + 3);
    compressed.push(history[0].clone());
    compressed.push(Message::system(compression_note(cut)));
    compressed.extend(body[cut..].iter().cloned());
    compressed.push(history[last].clone());
    Some((compressed, cut))
}

/// Compress a stored session in place. Returns how many messages were
/// dropped, or `None` if the history was too short.
pub async fn compress_session(
    sessions: &dyn SessionStore,
    events: &EventBus,
    key: &str,
) -> Result<Option<usize>, Error> {
    let history = sessions.history(key).await?;
    let Some((compressed, dropped)) = force_compress(&history) else {
        return Ok(None);
    };

    let remaining = compressed.len();
    sessions.set_history(key, compressed).await?;
    sessions.save(key).await?;

    info!(session = %key, dropped, remaining, "Force-compressed history");
    events.publish(DomainEvent::HistoryCompressed {
        session: key.to_string(),
        dropped,
        remaining,
        timestamp: Utc::now(),
    });
    Ok(Some(dropped))
}
