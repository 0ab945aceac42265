//! Per-session keepalive pings.

use crate::client::{ClientConnection, SessionRegistry};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Why the keepalive task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveOutcome {
    /// The connection was closed by someone else.
    Cancelled,
    /// A ping could not be written. The session was deregistered.
    PingFailed,
}

/// Ping `conn` every `ping_period` until it closes or a ping fails.
///
/// A failed ping only deregisters the session. Closing the transport is left
/// to the read loop, which notices via its own read deadline.
pub async fn run_keepalive(
    registry: Arc<SessionRegistry>,
    user_id: String,
    conn: Arc<ClientConnection>,
    ping_period: Duration,
) -> KeepaliveOutcome {
    let mut ticker = interval_at(Instant::now() + ping_period, ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = conn.closed() => {
                debug!("Keepalive for {} stopped: connection closed", user_id);
                return KeepaliveOutcome::Cancelled;
            }

            _ = ticker.tick() => {
                if let Err(e) = conn.ping().await {
                    warn!("Ping to {} failed: {}", user_id, e);
                    counter!("gateway_ping_failures_total").increment(1);
                    registry.remove_if_current(&user_id, conn.id);
                    return KeepaliveOutcome::PingFailed;
                }
                debug!("Sent ping to {}", user_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message;
    use futures::channel::mpsc;
    use futures::{SinkExt, StreamExt};

    const PING_PERIOD: Duration = Duration::from_secs(54);

    fn connection() -> (Arc<ClientConnection>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded();
        let conn = ClientConnection::new(
            tx.sink_map_err(axum::Error::new),
            Duration::from_secs(10),
        );
        (Arc::new(conn), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_every_period() {
        let registry = Arc::new(SessionRegistry::new());
        let (conn, mut rx) = connection();
        registry.register("alice", conn.clone());

        let task = tokio::spawn(run_keepalive(
            registry.clone(),
            "alice".to_string(),
            conn.clone(),
            PING_PERIOD,
        ));

        assert!(matches!(rx.next().await, Some(Message::Ping(_))));
        assert!(matches!(rx.next().await, Some(Message::Ping(_))));

        conn.close().await;
        assert_eq!(task.await.unwrap(), KeepaliveOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ping_deregisters() {
        let registry = Arc::new(SessionRegistry::new());
        let (conn, rx) = connection();
        registry.register("alice", conn.clone());
        drop(rx);

        let outcome =
            run_keepalive(registry.clone(), "alice".to_string(), conn.clone(), PING_PERIOD).await;

        assert_eq!(outcome, KeepaliveOutcome::PingFailed);
        assert!(!registry.is_online("alice"));
        assert!(!conn.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_session_stops_keepalive() {
        let registry = Arc::new(SessionRegistry::new());
        let (stale, _stale_rx) = connection();
        let (fresh, _fresh_rx) = connection();
        registry.register("alice", stale.clone());
        registry.register("alice", fresh.clone());

        let outcome = run_keepalive(registry.clone(), "alice".to_string(), stale, PING_PERIOD).await;

        assert_eq!(outcome, KeepaliveOutcome::Cancelled);
        assert_eq!(registry.current_connection("alice"), Some(fresh.id));
    }
}
