//! The deterministic reducer from per-check results to a service snapshot,
//! plus the incident open/update/resolve state machine. Every function here
//! is pure and DB-free so it can be tested without a transaction.

use crate::id::ServiceId;
use crate::models::{CheckStatus, IncidentSeverity, ServiceDependencyType};

/// One enabled check's latest result, reduced to what scoring needs.
#[derive(Debug, Clone, Copy)]
pub struct CheckSignal {
    pub status: CheckStatus,
    pub latency_ms: Option<i32>,
    pub weight: f64,
}

/// A dependency's declared edge plus its latest observed status.
#[derive(Debug, Clone, Copy)]
pub struct DependencySignal {
    pub dependency_service_id: ServiceId,
    pub dependency_status: CheckStatus,
    pub dependency_type: ServiceDependencyType,
    pub weight: f64,
}

/// Per-check score from status and latency. `up` is always 100, `down` always
/// 0; `degraded` interpolates by latency bucket.
pub fn score_for(status: CheckStatus, latency_ms: Option<i32>) -> f64 {
    match status {
        CheckStatus::Up => 100.0,
        CheckStatus::Down => 0.0,
        CheckStatus::Degraded => match latency_ms {
            None => 60.0,
            Some(ms) if ms <= 500 => 80.0,
            Some(ms) if ms <= 1000 => 65.0,
            Some(_) => 45.0,
        },
    }
}

/// Weighted average of per-check scores. 100 when there are no signals at all
/// (a service with no results yet is presumed healthy).
pub fn raw_score(signals: &[CheckSignal]) -> f64 {
    if signals.is_empty() {
        return 100.0;
    }
    let total_weight: f64 = signals.iter().map(|s| s.weight).sum();
    if total_weight <= 0.0 {
        return 100.0;
    }
    signals
        .iter()
        .map(|s| score_for(s.status, s.latency_ms) * s.weight)
        .sum::<f64>()
        / total_weight
}

/// `>= 95 -> up`, `>= 60 -> degraded`, else `down`. Monotone in `raw_score`.
pub fn status_from_score(raw_score: f64) -> CheckStatus {
    if raw_score >= 95.0 {
        CheckStatus::Up
    } else if raw_score >= 60.0 {
        CheckStatus::Degraded
    } else {
        CheckStatus::Down
    }
}

/// Result of dependency attribution: whether the status is explained by an
/// upstream, and if so by which service and with what confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attribution {
    pub impacted: bool,
    pub root_service_id: Option<ServiceId>,
    pub confidence: f64,
}

impl Attribution {
    fn none() -> Self {
        Self {
            impacted: false,
            root_service_id: None,
            confidence: 0.0,
        }
    }
}

fn severity_factor(status: CheckStatus) -> f64 {
    if status == CheckStatus::Down {
        1.0
    } else {
        0.6
    }
}

fn type_factor(dependency_type: ServiceDependencyType) -> f64 {
    if dependency_type == ServiceDependencyType::Hard {
        1.3
    } else {
        1.0
    }
}

/// Attributes a non-`up` status to the most impactful degraded/down
/// dependency, if any. `weight` gates which signals are considered (`> 0`)
/// and also scales `impact_score` directly.
pub fn attribute(service_status: CheckStatus, signals: &[DependencySignal]) -> Attribution {
    if service_status == CheckStatus::Up {
        return Attribution::none();
    }

    let mut best: Option<(f64, ServiceId)> = None;
    for signal in signals {
        if signal.weight <= 0.0 {
            continue;
        }
        if !matches!(
            signal.dependency_status,
            CheckStatus::Degraded | CheckStatus::Down
        ) {
            continue;
        }
        let impact_score =
            signal.weight * severity_factor(signal.dependency_status) * type_factor(signal.dependency_type);
        if best.map(|(b, _)| impact_score > b).unwrap_or(true) {
            best = Some((impact_score, signal.dependency_service_id));
        }
    }

    match best {
        None => Attribution::none(),
        Some((impact_score, root)) => {
            let confidence = (0.35 + 0.4 * impact_score).min(0.95);
            let confidence = (confidence * 1000.0).round() / 1000.0;
            Attribution {
                impacted: true,
                root_service_id: Some(root),
                confidence,
            }
        }
    }
}

/// Lifts `raw_score` toward 100 in proportion to attribution confidence when
/// the status is explained by an upstream; otherwise equals `raw_score`.
pub fn effective_score(raw_score: f64, attribution: &Attribution) -> f64 {
    if !attribution.impacted {
        return raw_score;
    }
    let lifted = (raw_score + (100.0 - raw_score) * (0.15 + 0.35 * attribution.confidence)).min(100.0);
    (lifted * 100.0).round() / 100.0
}

/// The computed outcome of one worker pass over a service's latest signals,
/// ready to be written as a `ServiceSnapshot` and folded into incident state.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotOutcome {
    pub raw_score: f64,
    pub effective_score: f64,
    pub status: CheckStatus,
    pub dependency_impacted: bool,
    pub attribution_confidence: f64,
    pub probable_root_service_id: Option<ServiceId>,
}

pub fn compute_snapshot(
    check_signals: &[CheckSignal],
    dependency_signals: &[DependencySignal],
) -> SnapshotOutcome {
    let raw = raw_score(check_signals);
    let status = status_from_score(raw);
    let attribution = attribute(status, dependency_signals);
    let effective = effective_score(raw, &attribution);

    SnapshotOutcome {
        raw_score: raw,
        effective_score: effective,
        status,
        dependency_impacted: attribution.impacted,
        attribution_confidence: attribution.confidence,
        probable_root_service_id: attribution.root_service_id,
    }
}

/// The three legal incident transitions: `(no incident) -> open`,
/// `(open) -> open` (severity/root/confidence refresh), `(open) -> resolved`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IncidentTransition {
    NoOp,
    Open {
        peak_severity: IncidentSeverity,
    },
    Update {
        peak_severity: IncidentSeverity,
    },
    Resolve,
}

/// Decides which transition applies given the newly computed status and
/// whether an incident is currently open. Does not touch the database —
/// callers apply the transition and write the matching `IncidentEvent`.
pub fn next_transition(status: CheckStatus, incident_open: bool) -> IncidentTransition {
    match IncidentSeverity::from_check_status(status) {
        None => {
            if incident_open {
                IncidentTransition::Resolve
            } else {
                IncidentTransition::NoOp
            }
        }
        Some(severity) => {
            if incident_open {
                IncidentTransition::Update {
                    peak_severity: severity,
                }
            } else {
                IncidentTransition::Open {
                    peak_severity: severity,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServiceDependencyType;
    use uuid::Uuid;

    fn service_id() -> ServiceId {
        ServiceId::from_uuid(Uuid::now_v7())
    }

    #[test]
    fn boundary_degraded_latency_scores() {
        assert_eq!(score_for(CheckStatus::Degraded, Some(500)), 80.0);
        assert_eq!(score_for(CheckStatus::Degraded, Some(1000)), 65.0);
        assert_eq!(score_for(CheckStatus::Degraded, Some(1001)), 45.0);
    }

    #[test]
    fn status_from_score_boundaries() {
        assert_eq!(status_from_score(95.0), CheckStatus::Up);
        assert_eq!(status_from_score(94.999), CheckStatus::Degraded);
        assert_eq!(status_from_score(60.0), CheckStatus::Degraded);
        assert_eq!(status_from_score(59.999), CheckStatus::Down);
    }

    #[test]
    fn no_signals_is_fully_healthy() {
        assert_eq!(raw_score(&[]), 100.0);
    }

    #[test]
    fn seed_scenario_a_single_healthy_service() {
        let signals = [CheckSignal {
            status: CheckStatus::Up,
            latency_ms: Some(120),
            weight: 1.0,
        }];
        let outcome = compute_snapshot(&signals, &[]);
        assert_eq!(outcome.raw_score, 100.0);
        assert_eq!(outcome.status, CheckStatus::Up);
        assert!(!outcome.dependency_impacted);
        assert_eq!(outcome.attribution_confidence, 0.0);
        assert_eq!(outcome.effective_score, 100.0);
    }

    #[test]
    fn seed_scenario_b_degraded_with_slow_check() {
        let signals = [
            CheckSignal {
                status: CheckStatus::Degraded,
                latency_ms: Some(900),
                weight: 0.5,
            },
            CheckSignal {
                status: CheckStatus::Up,
                latency_ms: Some(100),
                weight: 0.5,
            },
        ];
        let outcome = compute_snapshot(&signals, &[]);
        assert_eq!(outcome.raw_score, 82.5);
        assert_eq!(outcome.status, CheckStatus::Degraded);
        assert_eq!(outcome.effective_score, 82.5);

        let transition = next_transition(outcome.status, false);
        assert_eq!(
            transition,
            IncidentTransition::Open {
                peak_severity: IncidentSeverity::Degraded
            }
        );
    }

    #[test]
    fn seed_scenario_c_dependency_attributed_outage() {
        let dep_id = service_id();
        let check_signals = [CheckSignal {
            status: CheckStatus::Down,
            latency_ms: None,
            weight: 1.0,
        }];
        let dependency_signals = [DependencySignal {
            dependency_service_id: dep_id,
            dependency_status: CheckStatus::Down,
            dependency_type: ServiceDependencyType::Hard,
            weight: 1.0,
        }];
        let outcome = compute_snapshot(&check_signals, &dependency_signals);
        assert_eq!(outcome.raw_score, 0.0);
        assert!(outcome.dependency_impacted);
        assert_eq!(outcome.attribution_confidence, 0.870);
        assert_eq!(outcome.probable_root_service_id, Some(dep_id));
        assert_eq!(outcome.effective_score, 45.45);
    }

    #[test]
    fn boundary_hard_dependency_beats_soft() {
        let hard_id = service_id();
        let soft_id = service_id();
        let signals = [
            DependencySignal {
                dependency_service_id: hard_id,
                dependency_status: CheckStatus::Down,
                dependency_type: ServiceDependencyType::Hard,
                weight: 0.8,
            },
            DependencySignal {
                dependency_service_id: soft_id,
                dependency_status: CheckStatus::Down,
                dependency_type: ServiceDependencyType::Soft,
                weight: 0.5,
            },
        ];
        let attribution = attribute(CheckStatus::Down, &signals);
        assert_eq!(attribution.root_service_id, Some(hard_id));
        // impact_score: hard = 0.8*1.0*1.3 = 1.04, soft = 0.5*1.0*1.0 = 0.5
        assert!((attribution.confidence - 0.766).abs() < 1e-9);
    }

    #[test]
    fn up_status_is_never_impacted() {
        let dep_id = service_id();
        let signals = [DependencySignal {
            dependency_service_id: dep_id,
            dependency_status: CheckStatus::Down,
            dependency_type: ServiceDependencyType::Hard,
            weight: 1.0,
        }];
        let attribution = attribute(CheckStatus::Up, &signals);
        assert!(!attribution.impacted);
        assert_eq!(attribution.confidence, 0.0);
    }

    #[test]
    fn seed_scenario_f_recovery_resolves_incident() {
        let transition = next_transition(CheckStatus::Up, true);
        assert_eq!(transition, IncidentTransition::Resolve);

        let noop = next_transition(CheckStatus::Up, false);
        assert_eq!(noop, IncidentTransition::NoOp);
    }

    #[test]
    fn effective_score_never_drops_below_raw() {
        let attribution = Attribution {
            impacted: true,
            root_service_id: Some(service_id()),
            confidence: 0.6,
        };
        let effective = effective_score(40.0, &attribution);
        assert!(effective >= 40.0);
    }
}
