use axum::extract::ws::{CloseFrame, Message};

use super::protocol::ServerEvent;
use super::ConnectionSender;

/// Encode an event as a text frame.
pub fn encode(event: &ServerEvent) -> Option<Message> {
    event.to_json().map(|json| Message::Text(json.into()))
}

/// Send an event to one connection. Returns false if the connection is gone.
pub fn send_event(sender: &ConnectionSender, event: &ServerEvent) -> bool {
    match encode(event) {
        Some(msg) => sender.send(msg).is_ok(),
        None => false,
    }
}

/// Send one pre-encoded frame to every sender. Returns how many accepted it.
pub fn fan_out<'a>(senders: impl IntoIterator<Item = &'a ConnectionSender>, msg: &Message) -> usize {
    senders
        .into_iter()
        .filter(|sender| sender.send(msg.clone()).is_ok())
        .count()
}

/// Ask the writer task to close the socket with `code` and `reason`.
pub fn force_close(sender: &ConnectionSender, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_string().into(),
    };
    let _ = sender.send(Message::Close(Some(frame)));
}
