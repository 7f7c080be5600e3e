//! Remote audio attachment
//!
//! The UI's audio element and the remote media stream become available on
//! independent schedules; whichever arrives last, the attach step keeps
//! retrying until both are present or the window closes.

use std::sync::Arc;

use tracing::{error, info};

use crate::error::Error;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::signaling::{CallSession, SinkSlot};

/// Route the session's remote audio into whatever sink is mounted.
///
/// Retries per `policy` while either the remote stream or the sink is
/// missing. Assign failures are logged, not propagated: the call continues
/// without audio rather than being torn down.
pub(crate) async fn attach_remote_audio(
    session: Arc<dyn CallSession>,
    sink: SinkSlot,
    policy: RetryConfig,
) {
    let found = retry_with_backoff("attach_remote_audio", policy, || {
        let session = Arc::clone(&session);
        let sink = sink.clone();
        async move {
            let stream = session.remote_stream().ok_or_else(|| Error::TrackAttachFailed {
                reason: "remote stream not yet available".to_string(),
            })?;
            let sink = sink.current().ok_or_else(|| Error::TrackAttachFailed {
                reason: "audio sink not mounted".to_string(),
            })?;
            Ok((stream, sink))
        }
    })
    .await;

    match found {
        Ok((stream, sink)) => {
            if let Err(e) = sink.assign(stream) {
                error!(
                    error = %e,
                    category = e.category(),
                    "failed to route remote audio, call continues without it"
                );
            } else {
                info!("remote audio routed to sink");
            }
        }
        Err(e) => {
            error!(error = %e, "remote audio never became attachable");
        }
    }
}
