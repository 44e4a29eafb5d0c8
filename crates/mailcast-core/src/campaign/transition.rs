//! Campaign status transitions

use super::CampaignError;
use chrono::{DateTime, Utc};
use mailcast_storage::models::CampaignStatus;

use CampaignStatus::*;

/// Every status change a client may request
pub const TRANSITIONS: [(CampaignStatus, CampaignStatus); 7] = [
    (Draft, Scheduled),
    (Scheduled, Draft),
    (Draft, Running),
    (Paused, Running),
    (Running, Paused),
    (Running, Cancelled),
    (Paused, Cancelled),
];

pub fn is_allowed(from: CampaignStatus, to: CampaignStatus) -> bool {
    TRANSITIONS.contains(&(from, to))
}

/// Check a requested status change. Scheduling additionally needs a
/// `send_at` later than `now`.
pub fn validate_transition(
    from: CampaignStatus,
    to: CampaignStatus,
    send_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), CampaignError> {
    if !is_allowed(from, to) {
        return Err(CampaignError::InvalidTransition { from, to });
    }

    if to == Scheduled && !send_at.is_some_and(|at| at > now) {
        return Err(CampaignError::SendAtRequired);
    }

    Ok(())
}

/// Content fields are frozen once a campaign has started or ended
pub fn is_content_immutable(status: CampaignStatus) -> bool {
    matches!(status, Running | Cancelled | Finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_every_pair_against_table() {
        let now = Utc::now();
        let send_at = Some(now + Duration::hours(1));

        let mut allowed = 0;
        for from in CampaignStatus::ALL {
            for to in CampaignStatus::ALL {
                let result = validate_transition(from, to, send_at, now);
                if TRANSITIONS.contains(&(from, to)) {
                    assert!(result.is_ok(), "{} -> {} should be allowed", from, to);
                    allowed += 1;
                } else {
                    match result {
                        Err(CampaignError::InvalidTransition { from: f, to: t }) => {
                            assert_eq!((f, t), (from, to));
                        }
                        other => panic!("{} -> {}: unexpected {:?}", from, to, other),
                    }
                }
            }
        }
        assert_eq!(allowed, 7);
    }

    #[test]
    fn test_finished_is_never_a_target() {
        for from in CampaignStatus::ALL {
            assert!(!is_allowed(from, Finished));
        }
        for to in CampaignStatus::ALL {
            assert!(!is_allowed(Finished, to));
            assert!(!is_allowed(Cancelled, to));
        }
    }

    #[test]
    fn test_scheduling_needs_future_send_at() {
        let now = Utc::now();

        assert!(matches!(
            validate_transition(Draft, Scheduled, None, now),
            Err(CampaignError::SendAtRequired)
        ));
        assert!(matches!(
            validate_transition(Draft, Scheduled, Some(now - Duration::minutes(1)), now),
            Err(CampaignError::SendAtRequired)
        ));
        assert!(matches!(
            validate_transition(Draft, Scheduled, Some(now), now),
            Err(CampaignError::SendAtRequired)
        ));
        assert!(validate_transition(Draft, Scheduled, Some(now + Duration::minutes(1)), now).is_ok());
    }

    #[test]
    fn test_send_at_only_matters_for_scheduling() {
        let now = Utc::now();
        assert!(validate_transition(Draft, Running, None, now).is_ok());
        assert!(validate_transition(Scheduled, Draft, None, now).is_ok());
    }

    #[test]
    fn test_content_immutability() {
        let frozen: Vec<_> = CampaignStatus::ALL
            .into_iter()
            .filter(|s| is_content_immutable(*s))
            .collect();
        assert_eq!(frozen, vec![Running, Cancelled, Finished]);
    }
}
