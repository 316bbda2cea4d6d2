use tracing::{debug, info};

use crate::{
    scoring::derive_result,
    service::{DataService, MatchFilter},
    stage::{Stage, StageReport},
    types::{MatchPatch, MatchStatus},
};

/// Derives H/D/A for live and completed matches with both scores entered and
/// writes it back when it differs from the stored result.
pub async fn derive_results<S>(service: &S) -> StageReport
where
    S: DataService + ?Sized,
{
    let mut report = StageReport::new(Stage::Result);

    let candidates = match service
        .list_matches(&MatchFilter::with_statuses(&[MatchStatus::Live, MatchStatus::Completed]))
        .await
    {
        Ok(listing) => report.accept(listing),
        Err(e) => return report.abort(e),
    };

    for m in candidates {
        report.examined += 1;

        // Scores not entered yet is the normal pending state.
        let Some(result) = derive_result(m.home_score, m.away_score) else {
            continue;
        };
        if m.result == Some(result) {
            continue;
        }

        match service.update_match(&m.id, &MatchPatch::result(result)).await {
            Ok(_) => {
                report.written += 1;
                info!(
                    match_id = %m.id,
                    previous = ?m.result.map(|r| r.code()),
                    "{} {}-{} => {}",
                    m.label(),
                    m.home_score.unwrap_or_default(),
                    m.away_score.unwrap_or_default(),
                    result
                );
            }
            Err(e) => {
                if let Some(e) = report.record_failure(&m.id, e) {
                    return report.abort(e);
                }
            }
        }
    }

    debug!("result stage: {} results written out of {} matches", report.written, report.examined);
    report
}
