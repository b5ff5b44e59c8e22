//! Texts and messages the ticket flow sends.

use std::time::Duration;

use super::lifecycle::TicketThresholds;
use super::CloseReason;
use crate::channels::{ButtonStyle, Embed, OutgoingMessage, TicketUser, CLOSE_TICKET_ID, OPEN_TICKET_ID};

pub const ACCENT_COLOR: u32 = 0x00AE86;

pub const DEFAULT_WELCOME_IMAGE: &str = "https://fastcdn.hoyoverse.com/content-v2/hk4e/159934/9a54a8fc8b9183740df28a36f56da634_4301838442485055543.jpg";

/// Renders a threshold the way users read it: `24h`, `15min`, `1h 30min`.
pub fn human_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (hours, minutes, seconds) {
        (0, 0, s) => format!("{s}s"),
        (0, m, 0) => format!("{m}min"),
        (h, 0, 0) => format!("{h}h"),
        (0, m, s) => format!("{m}min {s}s"),
        (h, m, _) => format!("{h}h {m}min"),
    }
}

pub fn welcome(image_url: Option<&str>) -> OutgoingMessage {
    let mut embed = Embed::titled("🎉 Welcome to our boosting service!")
        .with_description(
            "We offer high quality Genshin Impact boosting. Press the button below to open a ticket and see the price list.",
        )
        .with_color(ACCENT_COLOR)
        .with_field("⚠️ Notice", "🔴 Do not spam tickets unless you want to be KICKED!");
    if let Some(url) = image_url {
        embed = embed.with_image(url);
    }
    OutgoingMessage::embed(embed).with_button(OPEN_TICKET_ID, "Open Ticket", ButtonStyle::Primary)
}

pub fn intro(owner: &TicketUser, thresholds: &TicketThresholds) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "🟢 Hi {}, this is your private ticket channel.\n\
         Type !prices to see the price list, !find <name> or !findprice <price> to search for a service.\n\
         ⚠️ This ticket is deleted automatically after {}, with a warning {} before.",
        owner.mention(),
        human_duration(thresholds.expiry),
        human_duration(thresholds.warning_lead()),
    ))
    .with_button(CLOSE_TICKET_ID, "Close Ticket", ButtonStyle::Danger)
}

pub fn created(channel_id: &str) -> String {
    format!("✅ Ticket created: <#{channel_id}>")
}

pub fn creation_failed() -> String {
    "❌ Could not create your ticket, please try again later.".to_string()
}

pub fn expiry_warning(thresholds: &TicketThresholds) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "⚠️ This ticket will be deleted automatically in {}!",
        human_duration(thresholds.warning_lead())
    ))
}

pub fn closing(reason: CloseReason, thresholds: &TicketThresholds) -> OutgoingMessage {
    let text = match reason {
        CloseReason::UserRequested => "⏹ Ticket closed by the user.".to_string(),
        CloseReason::Expired => "⏰ This ticket has expired and will be deleted.".to_string(),
        CloseReason::Inactive => format!(
            "⏰ Ticket deleted after {} without activity.",
            human_duration(thresholds.inactivity)
        ),
    };
    OutgoingMessage::text(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_duration() {
        assert_eq!(human_duration(Duration::from_secs(24 * 3600)), "24h");
        assert_eq!(human_duration(Duration::from_secs(15 * 60)), "15min");
        assert_eq!(human_duration(Duration::from_secs(5400)), "1h 30min");
        assert_eq!(human_duration(Duration::from_secs(42)), "42s");
        assert_eq!(human_duration(Duration::from_secs(90)), "1min 30s");
    }

    #[test]
    fn test_default_texts_mention_thresholds() {
        let t = TicketThresholds::default();
        let warning = expiry_warning(&t);
        assert_eq!(
            warning.content.as_deref(),
            Some("⚠️ This ticket will be deleted automatically in 1h!")
        );
        let inactive = closing(CloseReason::Inactive, &t);
        assert!(inactive.content.unwrap().contains("12h"));
    }

    #[test]
    fn test_intro_carries_close_button() {
        let owner = TicketUser {
            id: "7".to_string(),
            username: "amy".to_string(),
        };
        let intro = intro(&owner, &TicketThresholds::default());
        assert!(intro.content.as_deref().unwrap_or_default().contains("<@7>"));
        assert_eq!(intro.buttons.len(), 1);
        assert_eq!(intro.buttons[0].custom_id, CLOSE_TICKET_ID);
    }

    #[test]
    fn test_welcome_has_open_button() {
        let welcome = welcome(Some("https://example.com/banner.jpg"));
        assert_eq!(welcome.buttons[0].custom_id, OPEN_TICKET_ID);
        assert_eq!(
            welcome.embeds[0].image_url.as_deref(),
            Some("https://example.com/banner.jpg")
        );
    }
}
