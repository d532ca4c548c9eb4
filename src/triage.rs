use axum::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::issues::repo::{self, IssueCategory, IssuePriority};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("analysis endpoint: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected analysis payload: {0}")]
    Payload(String),
}

/// What a classifier inferred for a new report. `category` is `None` when
/// nothing matched; callers decide whether to overwrite the reporter's choice.
#[derive(Debug, Clone, Serialize)]
pub struct TriageOutcome {
    pub category: Option<IssueCategory>,
    pub priority: IssuePriority,
    pub sentiment_score: f64,
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait TriageClient: Send + Sync {
    async fn classify(&self, title: &str, description: &str) -> Result<TriageOutcome, TriageError>;
}

// Keyword tables for the built-in classifier. Order matters: the first
// category with the highest hit count wins.
const CATEGORY_KEYWORDS: &[(IssueCategory, &[&str])] = &[
    (
        IssueCategory::Pothole,
        &["pothole", "crater", "asphalt", "pavement", "sinkhole", "road surface"],
    ),
    (
        IssueCategory::Garbage,
        &["garbage", "trash", "litter", "rubbish", "waste", "dumping", "dumpster"],
    ),
    (
        IssueCategory::WaterLeak,
        &["water leak", "leaking", "burst pipe", "pipe", "water main", "hydrant"],
    ),
    (
        IssueCategory::Streetlight,
        &["streetlight", "street light", "lamp post", "light out", "dark street"],
    ),
    (
        IssueCategory::Drainage,
        &["drain", "drainage", "sewage", "sewer", "overflow", "clogged", "flood"],
    ),
    (
        IssueCategory::Vandalism,
        &["graffiti", "vandal", "broken window", "smashed", "defaced"],
    ),
];

const CRITICAL_WORDS: &[&str] = &[
    "gas", "live wire", "electrocut", "collapse", "sinkhole", "explosion", "fire",
];
const HIGH_WORDS: &[&str] = &[
    "danger", "burst", "overflow", "accident", "injur", "school", "hospital", "flood",
];

const POSITIVE_WORDS: &[&str] = &["thanks", "good", "great", "appreciate", "clean", "fixed"];
const NEGATIVE_WORDS: &[&str] = &[
    "terrible", "awful", "dangerous", "disgusting", "horrible", "worst", "unsafe", "stink",
    "broken", "filthy",
];

/// Deterministic classifier; also the fallback when the endpoint fails.
pub struct KeywordTriage;

impl KeywordTriage {
    pub fn classify_text(title: &str, description: &str) -> TriageOutcome {
        let text = format!("{} {}", title, description).to_lowercase();

        let mut category = None;
        let mut best_hits = 0usize;
        for (cat, words) in CATEGORY_KEYWORDS {
            let hits = words.iter().filter(|w| text.contains(**w)).count();
            if hits > best_hits {
                best_hits = hits;
                category = Some(cat.clone());
            }
        }

        let priority = if CRITICAL_WORDS.iter().any(|w| text.contains(w)) {
            IssuePriority::Critical
        } else if HIGH_WORDS.iter().any(|w| text.contains(w)) {
            IssuePriority::High
        } else {
            IssuePriority::Medium
        };

        let pos = POSITIVE_WORDS.iter().filter(|w| text.contains(**w)).count() as f64;
        let neg = NEGATIVE_WORDS.iter().filter(|w| text.contains(**w)).count() as f64;
        let sentiment_score = (pos - neg) / (pos + neg).max(1.0);

        let raw = serde_json::json!({
            "classifier": "keyword",
            "category_hits": best_hits,
            "positive_hits": pos,
            "negative_hits": neg,
        });

        TriageOutcome {
            category,
            priority,
            sentiment_score,
            raw,
        }
    }
}

#[async_trait]
impl TriageClient for KeywordTriage {
    async fn classify(&self, title: &str, description: &str) -> Result<TriageOutcome, TriageError> {
        Ok(Self::classify_text(title, description))
    }
}

/// External vision/language analysis over HTTPS. The endpoint receives the
/// report text and answers with labels and a sentiment value; labels are
/// mapped onto categories with the same keyword tables.
pub struct HttpTriage {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpTriage {
    pub fn new(url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            api_key,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct AnalysisResponse {
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    sentiment: f64,
}

#[async_trait]
impl TriageClient for HttpTriage {
    async fn classify(&self, title: &str, description: &str) -> Result<TriageOutcome, TriageError> {
        let mut req = self.client.post(&self.url).json(&serde_json::json!({
            "title": title,
            "description": description,
        }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            return Err(TriageError::Payload(format!(
                "analysis endpoint returned {}",
                res.status()
            )));
        }
        let raw: serde_json::Value = res.json().await?;
        let parsed: AnalysisResponse = serde_json::from_value(raw.clone())
            .map_err(|e| TriageError::Payload(e.to_string()))?;

        // Labels are free-form; fold them through the keyword tables.
        let label_text = parsed.labels.join(" ").to_lowercase();
        let keyword = KeywordTriage::classify_text(title, description);
        let mut category = None;
        let mut best_hits = 0usize;
        for (cat, words) in CATEGORY_KEYWORDS {
            let hits = words.iter().filter(|w| label_text.contains(**w)).count();
            if hits > best_hits {
                best_hits = hits;
                category = Some(cat.clone());
            }
        }

        Ok(TriageOutcome {
            category: category.or(keyword.category),
            priority: keyword.priority,
            sentiment_score: parsed.sentiment.clamp(-1.0, 1.0),
            raw,
        })
    }
}

/// Spawned after an issue commits. Classifies the report and writes the
/// inferred fields back; the reporter's explicit category wins unless they
/// picked `other`. Failures leave the row untouched.
pub async fn run_triage(
    state: AppState,
    issue_id: Uuid,
    title: String,
    description: String,
    submitted: IssueCategory,
) {
    let outcome = match state.triage.classify(&title, &description).await {
        Ok(o) => o,
        Err(e) => {
            warn!(error = %e, %issue_id, "triage endpoint failed; falling back to keywords");
            KeywordTriage::classify_text(&title, &description)
        }
    };

    let category = if submitted == IssueCategory::Other {
        outcome.category.clone()
    } else {
        None
    };

    match repo::apply_triage(
        &state.db,
        issue_id,
        category.as_ref(),
        &outcome.priority,
        outcome.sentiment_score,
        &outcome.raw,
    )
    .await
    {
        Ok(()) => {
            info!(%issue_id, category = ?category, priority = ?outcome.priority,
                  sentiment = outcome.sentiment_score, "triage applied")
        }
        Err(e) => warn!(error = %e, %issue_id, "triage write-back failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pothole_text_maps_to_pothole() {
        let out = KeywordTriage::classify_text(
            "Huge pothole on Elm street",
            "The asphalt has a deep crater, cars swerve around it",
        );
        assert_eq!(out.category, Some(IssueCategory::Pothole));
    }

    #[test]
    fn hazard_words_escalate_priority() {
        let out = KeywordTriage::classify_text(
            "Gas smell near the playground",
            "Strong gas odor, possibly a leaking line",
        );
        assert_eq!(out.priority, IssuePriority::Critical);

        let out = KeywordTriage::classify_text(
            "Burst pipe flooding the sidewalk",
            "Water everywhere near the school entrance",
        );
        assert_eq!(out.priority, IssuePriority::High);
    }

    #[test]
    fn plain_report_stays_medium_with_no_category() {
        let out = KeywordTriage::classify_text("Something odd", "Not sure what this is");
        assert_eq!(out.category, None);
        assert_eq!(out.priority, IssuePriority::Medium);
    }

    #[test]
    fn sentiment_is_bounded_and_signed() {
        let neg = KeywordTriage::classify_text(
            "Disgusting dump site",
            "Terrible smell, absolutely horrible corner",
        );
        assert!(neg.sentiment_score < 0.0);
        assert!(neg.sentiment_score >= -1.0);

        let pos = KeywordTriage::classify_text("Thanks", "Great work, the street is clean now");
        assert!(pos.sentiment_score > 0.0);
        assert!(pos.sentiment_score <= 1.0);
    }

    #[test]
    fn garbage_beats_single_drain_mention() {
        let out = KeywordTriage::classify_text(
            "Trash piling up",
            "Garbage and litter all over, some of it blocking a drain",
        );
        assert_eq!(out.category, Some(IssueCategory::Garbage));
    }
}
