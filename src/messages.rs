// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! User-facing message text.

use crate::config::ChannelRequirement;
use crate::error::Denial;
use crate::orchestrator::JobSummary;
use crate::provider::{FileInfo, FileKind};
use crate::transport::{Button, Keyboard, MediaKind};
use crate::verification::VerificationOutcome;
use std::time::Duration;

pub const CHECK_MEMBERSHIP: &str = "check_membership";

/// Human readable size, e.g. `1.5 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

/// Whole minutes, rounded up, never below one.
pub fn minutes_ceil(wait: Duration) -> u64 {
    wait.as_secs().div_ceil(60).max(1)
}

pub fn caption(info: &FileInfo, media: MediaKind, size: u64) -> String {
    let label = match (info.kind, media) {
        (FileKind::Folder, _) => "Folder",
        (_, MediaKind::Video) => "Video",
        (_, MediaKind::Photo) => "Image",
        (_, MediaKind::Document) => "File",
    };
    let name = if info.display_name.is_empty() {
        label
    } else {
        info.display_name.as_str()
    };
    format!("[{label}] {name}\nSize: {}", format_file_size(size))
}

pub fn welcome(display_name: &str) -> String {
    format!(
        "Hello {display_name}!\n\n\
         Send me a share link and I will fetch the content and deliver it here: \
         videos, photos, documents and whole folders, up to 2 GB.\n\n\
         To get started, join the channels below."
    )
}

pub fn help() -> &'static str {
    "How to use this bot:\n\n\
     1. Send a share link (file or folder)\n\
     2. The content is downloaded\n\
     3. It is delivered to you in this chat\n\n\
     Commands:\n\
     /start - Start the bot\n\
     /help - Show this help message\n\
     /status - Check your membership status\n\
     /verify - Verify your channel memberships"
}

pub fn join_prompt() -> &'static str {
    "Please join all channels below to use the bot:"
}

fn requirement_label(required: bool) -> &'static str {
    if required {
        "(Required)"
    } else {
        "(Optional)"
    }
}

/// One URL button per channel plus the "I have joined" callback.
pub fn join_keyboard(channels: &[ChannelRequirement]) -> Keyboard {
    let mut rows: Vec<Button> = channels
        .iter()
        .map(|c| Button::Url {
            text: format!("Join {} {}", c.display_name, requirement_label(c.required)),
            url: c.invite_link.clone(),
        })
        .collect();
    rows.push(Button::Callback {
        text: "I Have Joined All Channels".to_string(),
        data: CHECK_MEMBERSHIP.to_string(),
    });
    Keyboard { rows }
}

/// Per-channel membership report.
pub fn membership_report(heading: &str, outcome: &VerificationOutcome) -> String {
    let mut text = format!("{heading}\n\n");
    for channel in &outcome.per_channel {
        text.push_str(&format!(
            "{} {}: {}\n",
            channel.display_name,
            requirement_label(channel.required),
            if channel.joined { "Joined" } else { "Not Joined" }
        ));
    }
    text.push('\n');
    text.push_str(if outcome.all_required_satisfied {
        "All required channels verified! You can now use the bot."
    } else {
        "Please join all required channels to use the bot."
    });
    text
}

pub fn verifying() -> &'static str {
    "Verifying your channel memberships..."
}

pub fn cooldown(remaining: Duration) -> String {
    format!(
        "Please wait {} minutes before trying to verify again.",
        minutes_ceil(remaining)
    )
}

pub fn denial(denial: &Denial) -> String {
    match denial {
        Denial::NotAMember => {
            "Please join all required channels first to use this bot. \
             Use /start to get the join links."
                .to_string()
        }
        Denial::Cooldown { remaining } => cooldown(*remaining),
        Denial::RateLimited { retry_after } => format!(
            "Please wait {}s before sending another request.",
            retry_after.as_secs().max(1)
        ),
    }
}

pub fn processing(links: usize) -> String {
    if links == 1 {
        "Processing your link...".to_string()
    } else {
        format!("Processing your {links} links...")
    }
}

pub fn summary(summary: &JobSummary) -> String {
    let total = summary.outcomes.len();
    if summary.failed() == 0 {
        return if total == 1 {
            "File delivered successfully!".to_string()
        } else {
            format!("All {total} links processed successfully!")
        };
    }

    let mut text = format!("Delivered {} of {total} links.\n", summary.delivered());
    for (link, error) in summary.failures() {
        text.push_str(&format!("\n{link}\n  {error}"));
    }
    text
}

pub fn internal_error() -> &'static str {
    "An error occurred while processing your request. Please try again later."
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;
    use crate::orchestrator::LinkOutcome;
    use crate::verification::ChannelStatus;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10 MB");
        assert_eq!(format_file_size(2000 * 1024 * 1024), "1.95 GB");
    }

    #[test]
    fn test_minutes_round_up() {
        assert_eq!(minutes_ceil(Duration::from_secs(61)), 2);
        assert_eq!(minutes_ceil(Duration::from_secs(300)), 5);
        assert_eq!(minutes_ceil(Duration::from_millis(10)), 1);
    }

    #[test]
    fn test_join_keyboard_ends_with_callback() {
        let channels = vec![ChannelRequirement {
            id: "a".into(),
            display_name: "Alpha".into(),
            invite_link: "https://t.me/+a".into(),
            required: false,
        }];
        let keyboard = join_keyboard(&channels);
        assert_eq!(keyboard.rows.len(), 2);
        assert!(matches!(&keyboard.rows[0], Button::Url { text, .. } if text == "Join Alpha (Optional)"));
        assert!(matches!(&keyboard.rows[1], Button::Callback { data, .. } if data == CHECK_MEMBERSHIP));
    }

    #[test]
    fn test_membership_report_lists_channels() {
        let outcome = VerificationOutcome {
            per_channel: vec![ChannelStatus {
                channel_id: "a".into(),
                display_name: "Alpha".into(),
                required: true,
                joined: false,
            }],
            all_required_satisfied: false,
        };
        let text = membership_report("Status:", &outcome);
        assert!(text.contains("Alpha (Required): Not Joined"));
        assert!(text.ends_with("Please join all required channels to use the bot."));
    }

    #[test]
    fn test_summary_lists_failures() {
        let job = JobSummary {
            outcomes: vec![LinkOutcome {
                link: "https://terabox.com/s/x".into(),
                info: None,
                result: Err(JobError::ResolveFailed("gone".into())),
            }],
        };
        let text = summary(&job);
        assert!(text.starts_with("Delivered 0 of 1 links."));
        assert!(text.contains("Could not resolve link: gone"));
    }
}
