use crate::config::MAX_VARIATIONS;
use crate::error::ApiError;
use crate::provider::ProviderCapabilities;
use crate::types::ProviderId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Shape of one provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptKind {
    /// One image; `index` is the variation number within the provider.
    Single { index: u32 },
    /// Several images from one call; results are tagged `offset`, `offset + 1`, ...
    Batch { offset: u32, requested: u32 },
}

impl AttemptKind {
    pub fn requested(&self) -> u32 {
        match self {
            AttemptKind::Single { .. } => 1,
            AttemptKind::Batch { requested, .. } => *requested,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAttempt {
    pub provider: ProviderId,
    pub kind: AttemptKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPlan {
    pub provider: ProviderId,
    pub attempts: Vec<AttemptKind>,
}

/// Every provider call one request will make, in candidate order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationPlan {
    pub providers: Vec<ProviderPlan>,
    pub variations: u32,
    /// Requested ids with no registered provider
    pub skipped: Vec<ProviderId>,
}

impl GenerationPlan {
    /// Build a plan. Provider ids are trimmed and deduplicated keeping first occurrence;
    /// ids `capabilities` does not know are recorded in `skipped`.
    pub fn build<F>(providers: &[ProviderId], variations: u32, capabilities: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<ProviderCapabilities>,
    {
        if variations == 0 || variations > MAX_VARIATIONS {
            return Err(ApiError::InvalidRequest(format!(
                "variations must be between 1 and {}, got {}",
                MAX_VARIATIONS, variations
            )));
        }

        let mut seen = HashSet::new();
        let mut plans = Vec::new();
        let mut skipped = Vec::new();

        for provider in providers {
            let id = provider.trim();
            if id.is_empty() || !seen.insert(id.to_string()) {
                continue;
            }
            match capabilities(id) {
                Some(caps) => plans.push(ProviderPlan {
                    provider: id.to_string(),
                    attempts: plan_attempts(variations, caps),
                }),
                None => skipped.push(id.to_string()),
            }
        }

        Ok(Self {
            providers: plans,
            variations,
            skipped,
        })
    }

    pub fn attempts(&self) -> impl Iterator<Item = PlannedAttempt> + '_ {
        self.providers.iter().flat_map(|plan| {
            plan.attempts.iter().map(move |kind| PlannedAttempt {
                provider: plan.provider.clone(),
                kind: *kind,
            })
        })
    }

    pub fn total_attempts(&self) -> usize {
        self.providers.iter().map(|plan| plan.attempts.len()).sum()
    }

    /// Upper bound on candidates if every call succeeds in full.
    pub fn expected_candidates(&self) -> usize {
        self.providers.len() * self.variations as usize
    }

    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|plan| plan.provider.clone()).collect()
    }
}

fn plan_attempts(variations: u32, capabilities: ProviderCapabilities) -> Vec<AttemptKind> {
    if variations > 1 && capabilities.supports_batch && capabilities.max_batch > 1 {
        let mut attempts = Vec::new();
        let mut offset = 0;
        while offset < variations {
            let requested = (variations - offset).min(capabilities.max_batch);
            attempts.push(AttemptKind::Batch { offset, requested });
            offset += requested;
        }
        attempts
    } else {
        (0..variations)
            .map(|index| AttemptKind::Single { index })
            .collect()
    }
}
