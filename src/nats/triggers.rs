//! Write-trigger subscription
//!
//! External collaborators (profile service, inventory sync, pricing and
//! city-boost publishers) announce their writes on the trigger subject
//! space; this subscriber feeds them into the rebuild scheduler. Writes made
//! by this service notify the scheduler directly and do not pass through
//! NATS.
//!
//! Subjects:
//! - `lapidary.triggers.account.<account>` with the source name as payload
//! - `lapidary.triggers.global.pricing`
//! - `lapidary.triggers.global.city_boosts`

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::live::{GlobalDoc, RebuildScheduler, WriteSource};
use crate::nats::NatsClient;

/// Root of the trigger subject space
pub const TRIGGER_SUBJECT_PREFIX: &str = "lapidary.triggers";

/// A parsed trigger message
#[derive(Debug, PartialEq, Eq)]
pub enum Trigger {
    Account(String, WriteSource),
    Global(GlobalDoc),
}

/// Parse a trigger from its subject (relative to the prefix) and payload
pub fn parse_trigger(subject: &str, payload: &[u8]) -> Option<Trigger> {
    let suffix = subject
        .strip_prefix(TRIGGER_SUBJECT_PREFIX)?
        .strip_prefix('.')?;

    let mut parts = suffix.splitn(2, '.');
    match (parts.next()?, parts.next()) {
        ("global", Some("pricing")) => Some(Trigger::Global(GlobalDoc::Pricing)),
        ("global", Some("city_boosts")) => Some(Trigger::Global(GlobalDoc::CityBoosts)),
        ("account", Some(account)) if !account.is_empty() => {
            let source = match std::str::from_utf8(payload).unwrap_or("") {
                "profile" => WriteSource::Profile,
                "ledger" => WriteSource::Ledger,
                "staking" => WriteSource::Staking,
                "job" => WriteSource::Job,
                "inventory_summary" => WriteSource::InventorySummary,
                other => {
                    warn!(account = %account, source = %other, "unknown trigger source, treating as profile");
                    WriteSource::Profile
                }
            };
            Some(Trigger::Account(account.to_string(), source))
        }
        _ => None,
    }
}

/// Subscribe to the trigger subject space and drive the scheduler
pub fn spawn_trigger_subscriber(
    nats: NatsClient,
    scheduler: RebuildScheduler,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let subject = format!("{}.>", TRIGGER_SUBJECT_PREFIX);
        let mut subscription = match nats.inner().subscribe(subject.clone()).await {
            Ok(sub) => sub,
            Err(e) => {
                error!("Trigger subscription failed: {}", e);
                return;
            }
        };

        info!("Trigger subscriber listening on {}", subject);

        while let Some(message) = subscription.next().await {
            match parse_trigger(&message.subject, &message.payload) {
                Some(Trigger::Account(account, source)) => {
                    scheduler.note_write(&account, source);
                }
                Some(Trigger::Global(doc)) => {
                    scheduler.note_global_write(doc).await;
                }
                None => {
                    warn!(subject = %message.subject, "unparseable trigger message");
                }
            }
        }

        warn!("Trigger subscription closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_subjects_parse() {
        assert_eq!(
            parse_trigger("lapidary.triggers.global.pricing", b""),
            Some(Trigger::Global(GlobalDoc::Pricing))
        );
        assert_eq!(
            parse_trigger("lapidary.triggers.global.city_boosts", b""),
            Some(Trigger::Global(GlobalDoc::CityBoosts))
        );
    }

    #[test]
    fn account_subjects_carry_source_payload() {
        assert_eq!(
            parse_trigger("lapidary.triggers.account.alice", b"ledger"),
            Some(Trigger::Account("alice".to_string(), WriteSource::Ledger))
        );
        assert_eq!(
            parse_trigger("lapidary.triggers.account.alice", b"inventory_summary"),
            Some(Trigger::Account(
                "alice".to_string(),
                WriteSource::InventorySummary
            ))
        );
    }

    #[test]
    fn unknown_source_defaults_to_profile() {
        assert_eq!(
            parse_trigger("lapidary.triggers.account.alice", b"mystery"),
            Some(Trigger::Account("alice".to_string(), WriteSource::Profile))
        );
    }

    #[test]
    fn foreign_subjects_rejected() {
        assert_eq!(parse_trigger("other.subject", b""), None);
        assert_eq!(parse_trigger("lapidary.triggers.global.unknown", b""), None);
        assert_eq!(parse_trigger("lapidary.triggers.account.", b""), None);
        assert_eq!(parse_trigger("lapidary.triggers", b""), None);
    }
}
