use crate::error::CacheError;
use crate::tier::{TierId, TierRegistry};
use crate::value::DataKind;

use std::time::Duration;
use tracing::debug;

/// Size and TTL classification thresholds for smart placement.
#[derive(Debug, Clone)]
pub struct SelectorThresholds {
  /// Serialized sizes at or below this are "small".
  pub size_small_max: usize,
  /// Serialized sizes at or above this are "large".
  pub size_large_min: usize,
  /// TTLs at or below this are "short".
  pub ttl_short_max: Duration,
  /// TTLs at or above this are "long".
  pub ttl_long_min: Duration,
}

impl Default for SelectorThresholds {
  fn default() -> Self {
    Self {
      size_small_max: 1024,
      size_large_min: 64 * 1024,
      ttl_short_max: Duration::from_secs(60),
      ttl_long_min: Duration::from_secs(3600),
    }
  }
}

/// Why a tier was chosen, carried on the selection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
  ExplicitRequest,
  SmartPlacement,
  DefaultTier,
  AvailabilityFallback,
}

/// The selector's decision, with a confidence score for observability.
#[derive(Debug, Clone)]
pub struct TierDecision {
  pub tier: TierId,
  pub reason: SelectionReason,
  /// Agreement fraction of the smart-placement votes; 1.0 for explicit and
  /// default placements.
  pub confidence: f64,
}

/// Picks which registered backend should own an entry.
///
/// Pure with respect to side effects: it reads tier availability and
/// latency but never writes. All persistence happens in the orchestrator
/// after selection.
pub(crate) struct TierSelector {
  smart: bool,
  default_tier: TierId,
  thresholds: SelectorThresholds,
}

impl TierSelector {
  pub(crate) fn new(smart: bool, default_tier: TierId, thresholds: SelectorThresholds) -> Self {
    Self {
      smart,
      default_tier,
      thresholds,
    }
  }

  /// Decision order: explicit request, smart classification, default tier,
  /// first-available fallback, `NoBackendAvailable`.
  pub(crate) fn select(
    &self,
    key: &str,
    size_estimate: usize,
    kind: DataKind,
    ttl: Option<Duration>,
    requested: Option<&TierId>,
    registry: &TierRegistry,
  ) -> Result<TierDecision, CacheError> {
    if let Some(tier_id) = requested {
      let tier = registry
        .by_id(tier_id)
        .ok_or_else(|| CacheError::TierUnavailable(tier_id.clone()))?;
      if !tier.is_available() {
        return Err(CacheError::TierUnavailable(tier_id.clone()));
      }
      return Ok(TierDecision {
        tier: tier.id.clone(),
        reason: SelectionReason::ExplicitRequest,
        confidence: 1.0,
      });
    }

    let decision = if self.smart {
      self.classify(key, size_estimate, kind, ttl, registry)
    } else {
      TierDecision {
        tier: self.default_tier.clone(),
        reason: SelectionReason::DefaultTier,
        confidence: 1.0,
      }
    };

    // Fall back through the priority order when the choice is down.
    let chosen = registry
      .by_id(&decision.tier)
      .filter(|tier| tier.is_available());
    let decision = match chosen {
      Some(_) => decision,
      None => {
        let fallback = registry
          .first_available()
          .ok_or(CacheError::NoBackendAvailable)?;
        TierDecision {
          tier: fallback.id.clone(),
          reason: SelectionReason::AvailabilityFallback,
          confidence: decision.confidence,
        }
      }
    };

    debug!(
      key,
      tier = %decision.tier,
      reason = ?decision.reason,
      confidence = decision.confidence,
      "tier selected"
    );
    Ok(decision)
  }

  /// Classifies by size, TTL, and data kind; each classification votes for
  /// a priority index, and the averaged vote picks the tier. Ties among
  /// equally plausible tiers break toward the empirically faster one.
  fn classify(
    &self,
    _key: &str,
    size_estimate: usize,
    kind: DataKind,
    ttl: Option<Duration>,
    registry: &TierRegistry,
  ) -> TierDecision {
    let last = registry.len() - 1;
    let mid = last / 2;

    let size_vote = if size_estimate <= self.thresholds.size_small_max {
      0
    } else if size_estimate >= self.thresholds.size_large_min {
      last
    } else {
      mid
    };

    let ttl_vote = match ttl {
      Some(ttl) if ttl <= self.thresholds.ttl_short_max => 0,
      Some(ttl) if ttl >= self.thresholds.ttl_long_min => last,
      Some(_) => mid,
      // Untimed entries lean toward the durable end.
      None => last,
    };

    let kind_vote = match kind {
      DataKind::Primitive => 0,
      DataKind::Structured => mid,
      DataKind::Binary => last,
    };

    let votes = [size_vote, ttl_vote, kind_vote];
    let sum: usize = votes.iter().sum();
    let mut index = (sum as f64 / votes.len() as f64).round() as usize;
    index = index.min(last);

    // Agreement fraction: how many votes landed on the chosen index.
    let agreeing = votes.iter().filter(|&&v| v == index).count();
    let confidence = agreeing as f64 / votes.len() as f64;

    // Learning mode: when the vote is ambiguous, prefer the neighbouring
    // tier with the lower observed latency.
    if confidence < 0.5 && index > 0 {
      let here = registry.by_index(index);
      let above = registry.by_index(index - 1);
      if let (Some(here), Some(above)) = (here, above) {
        let here_lat = here.avg_latency_nanos();
        let above_lat = above.avg_latency_nanos();
        if above_lat > 0 && (here_lat == 0 || above_lat < here_lat) {
          index -= 1;
        }
      }
    }

    let tier = registry
      .by_index(index)
      .map(|tier| tier.id.clone())
      .unwrap_or_else(|| self.default_tier.clone());

    TierDecision {
      tier,
      reason: SelectionReason::SmartPlacement,
      confidence,
    }
  }
}
