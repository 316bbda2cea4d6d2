use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    service::{DataService, MatchFilter},
    stage::{Stage, StageReport},
    types::{MatchPatch, MatchStatus},
};

/// Moves every upcoming match whose kickoff has passed to `live`.
///
/// Only `upcoming` matches are selected, so running this again after a
/// successful pass touches nothing.
pub async fn lock_started_matches<S>(service: &S, now: DateTime<Utc>) -> StageReport
where
    S: DataService + ?Sized,
{
    let mut report = StageReport::new(Stage::Lock);

    let upcoming = match service
        .list_matches(&MatchFilter::with_status(MatchStatus::Upcoming).sorted_by_start())
        .await
    {
        Ok(listing) => report.accept(listing),
        Err(e) => return report.abort(e),
    };

    for m in upcoming {
        report.examined += 1;
        if m.starts_at > now {
            continue;
        }

        match service.update_match(&m.id, &MatchPatch::status(MatchStatus::Live)).await {
            Ok(_) => {
                report.written += 1;
                info!(match_id = %m.id, starts_at = %m.starts_at, "locked {}", m.label());
            }
            Err(e) => {
                if let Some(e) = report.record_failure(&m.id, e) {
                    return report.abort(e);
                }
            }
        }
    }

    debug!("lock stage: {}/{} upcoming matches locked", report.written, report.examined);
    report
}
