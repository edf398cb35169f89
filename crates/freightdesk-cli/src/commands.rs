//! Wiring of the session from config and the command handlers.

use std::sync::Arc;
use std::time::Duration;

use freightdesk_chat::{
    AuthSession, ChatConfig, ChatError, ChatSession, HttpChatBackend, PeerThreadOptions,
    QuoteContext, RealtimeConfig, RealtimeProvider, Recipient,
};
use freightdesk_common::{new_correlation_id, FreightdeskError};
use freightdesk_config::FreightdeskConfig;
use serde::Serialize;
use tracing::{info, Instrument};

use crate::{Cli, Command};

fn chat_error(e: ChatError) -> FreightdeskError {
    FreightdeskError::Chat(e.to_string())
}

pub(crate) fn chat_config(config: &FreightdeskConfig) -> ChatConfig {
    let session = &config.session;
    ChatConfig {
        refresh_buffer: Duration::from_secs(session.refresh_buffer.into()),
        history_page_size: session.history_page_size as usize,
        request_timeout: Duration::from_secs(config.backend.request_timeout.into()),
        join_timeout: Duration::from_secs(session.join_timeout.into()),
        proactive_refresh: session.proactive_refresh,
        event_capacity: session.event_capacity as usize,
    }
}

pub(crate) fn realtime_config(config: &FreightdeskConfig) -> RealtimeConfig {
    let realtime = &config.realtime;
    RealtimeConfig {
        url: realtime.url.clone(),
        api_key: realtime.api_key.clone(),
        access_token: None,
        heartbeat_interval_secs: realtime.heartbeat_interval.into(),
        reconnect_delay_secs: realtime.reconnect_delay.into(),
        max_reconnect_delay_secs: realtime.max_reconnect_delay.into(),
        connect_timeout_secs: realtime.connect_timeout.into(),
        reply_timeout_secs: realtime.reply_timeout.into(),
    }
}

fn build_session(config: &FreightdeskConfig, user_id: &str) -> Result<ChatSession, FreightdeskError> {
    let backend = HttpChatBackend::new(
        config.backend.base_url.clone(),
        Duration::from_secs(config.backend.request_timeout.into()),
        Duration::from_secs(config.backend.connect_timeout.into()),
    )
    .map_err(|e| FreightdeskError::Chat(e.to_string()))?;
    let provider = RealtimeProvider::new(realtime_config(config)).with_author_id(user_id);
    Ok(ChatSession::new(
        chat_config(config),
        Arc::new(backend),
        Arc::new(provider),
    ))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, FreightdeskError> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Run one command and return its JSON output.
pub(crate) async fn run(cli: Cli, config: &FreightdeskConfig) -> Result<String, FreightdeskError> {
    let session = build_session(config, &cli.user_id)?;
    let mut auth = AuthSession::new(cli.token, cli.user_id);
    if let Some(org_id) = cli.org_id {
        auth = auth.with_organization(org_id);
    }
    session.sign_in(auth).await;

    let span = tracing::info_span!("command", run_id = %new_correlation_id());
    let output = dispatch(&session, cli.command).instrument(span).await;
    session.sign_out().await;
    output
}

async fn dispatch(session: &ChatSession, command: Command) -> Result<String, FreightdeskError> {
    match command {
        Command::Open {
            quote,
            shipment,
            shipper,
            gallery,
        } => {
            let context = QuoteContext {
                quote_id: quote,
                shipment_id: shipment,
                shipper_branch_org_id: shipper,
                gallery_branch_org_id: gallery,
            };
            let thread = session
                .open_thread_for_quote(&context)
                .await
                .map_err(chat_error)?;
            info!(thread_id = %thread.id, "Opened thread");
            to_json(&thread)
        }
        Command::Peer {
            peer,
            quote,
            shipment,
            initiator,
        } => {
            let options = PeerThreadOptions {
                quote_id: quote,
                shipment_id: shipment,
                initiator_branch_org_id: initiator,
                ..PeerThreadOptions::new(peer)
            };
            let thread = session
                .open_peer_thread(&options)
                .await
                .map_err(chat_error)?;
            to_json(&thread)
        }
        Command::Send { thread, message } => {
            let sent = session
                .send_message(&thread, &message)
                .await
                .map_err(chat_error)?;
            to_json(&sent)
        }
        Command::Broadcast {
            quote,
            shippers,
            shipment,
            message,
        } => {
            let recipients: Vec<Recipient> = shippers
                .into_iter()
                .map(|shipper| {
                    let recipient = Recipient::shipper(shipper);
                    match &shipment {
                        Some(shipment) => recipient.with_shipment(shipment.clone()),
                        None => recipient,
                    }
                })
                .collect();
            let outcome = session
                .broadcast_to_recipients(&quote, &recipients, &message)
                .await;
            to_json(&outcome)
        }
        Command::Threads => {
            let threads = session.refresh_threads().await.map_err(chat_error)?;
            to_json(&threads)
        }
    }
}
