use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use sb_domain::config::Config;
use sb_domain::message::{Message, Response};

use crate::service::AgentService;

/// Capacity of the response fan-out to SSE clients. Slow clients that fall
/// further behind skip ahead.
const RESPONSE_BROADCAST_CAPACITY: usize = 256;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: AgentService,
    /// Every message published on the responses channel, re-broadcast for
    /// `GET /v1/responses/events`.
    pub responses: broadcast::Sender<Response>,
    /// Cancelled when the server begins shutting down; ends open streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wrap `service` and bridge its responses channel into a broadcast.
    pub fn new(service: AgentService) -> Self {
        let config = service.shared_config();
        let (responses, _) = broadcast::channel(RESPONSE_BROADCAST_CAPACITY);

        let tx = responses.clone();
        service.bus().subscribe(
            &config.bus.responses_channel,
            move |message: Message| {
                let tx = tx.clone();
                async move {
                    let response = Response::from_message(&message)?;
                    // No SSE clients connected is not an error.
                    let _ = tx.send(response);
                    Ok::<_, sb_domain::error::Error>(())
                }
            },
        );

        Self {
            config,
            service,
            responses,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn subscribe_responses(&self) -> broadcast::Receiver<Response> {
        self.responses.subscribe()
    }
}
