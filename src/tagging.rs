//! Keyword categorisation, content tagging, and topic-drift tracking.
//!
//! Categorisation is deliberately keyword-based: it exists to route
//! messages and label agents, not to be a classifier. Topic drift keeps an
//! exponential moving average of per-dimension vector deltas and grades the
//! average velocity into slow / moderate / rapid.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dimensionality of topic vectors.
pub const TOPIC_DIMENSIONS: usize = 8;

/// EMA smoothing factor for drift velocity.
const DRIFT_ALPHA: f64 = 0.3;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Behavioural category a message or agent falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Seeking new approaches.
    Exploration,
    /// Refining what already works.
    Exploitation,
    /// Producing genuinely novel work.
    Innovation,
    /// Preserving proven behaviour.
    Stabilization,
    /// Adjusting to changed conditions.
    Adaptation,
}

impl Category {
    /// All categories, in declaration order.
    pub const ALL: [Category; 5] = [
        Category::Exploration,
        Category::Exploitation,
        Category::Innovation,
        Category::Stabilization,
        Category::Adaptation,
    ];

    /// Lowercase name used in tags and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Exploration => "exploration",
            Category::Exploitation => "exploitation",
            Category::Innovation => "innovation",
            Category::Stabilization => "stabilization",
            Category::Adaptation => "adaptation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorise a message by keyword table.
///
/// Tables are checked in order; the first hit wins. A message matching no
/// table defaults to [`Category::Exploration`] at low confidence.
pub fn categorize(message: &str) -> (Category, f64) {
    const TABLES: [(&[&str], Category, f64); 5] = [
        (
            &["new", "create", "explore", "try", "discover"],
            Category::Exploration,
            0.85,
        ),
        (
            &["improve", "optimize", "refine", "better"],
            Category::Exploitation,
            0.82,
        ),
        (
            &["innovate", "novel", "unique", "revolutionary"],
            Category::Innovation,
            0.88,
        ),
        (
            &["stable", "maintain", "keep", "preserve"],
            Category::Stabilization,
            0.79,
        ),
        (
            &["adapt", "change", "adjust", "modify"],
            Category::Adaptation,
            0.83,
        ),
    ];

    let message = message.to_lowercase();
    for (keywords, category, confidence) in TABLES {
        if keywords.iter().any(|kw| message.contains(kw)) {
            return (category, confidence);
        }
    }
    (Category::Exploration, 0.60)
}

/// Generate topic tags for a piece of content, plus a `category:<name>` tag
/// when a category is supplied.
pub fn tag_content(content: &str, category: Option<Category>) -> Vec<String> {
    const TAG_KEYWORDS: [(&str, &[&str]); 5] = [
        ("performance", &["fast", "slow", "speed", "optimize"]),
        ("quality", &["good", "bad", "quality", "excellent"]),
        ("complexity", &["complex", "simple", "complicated", "easy"]),
        ("novelty", &["new", "novel", "unique", "original"]),
        ("stability", &["stable", "unstable", "reliable", "consistent"]),
    ];

    let content = content.to_lowercase();
    let mut tags: Vec<String> = TAG_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| content.contains(kw)))
        .map(|(tag, _)| (*tag).to_string())
        .collect();

    if let Some(category) = category {
        tags.push(format!("category:{category}"));
    }
    tags
}

// ---------------------------------------------------------------------------
// Topic drift
// ---------------------------------------------------------------------------

/// Grade of topic movement, by average drift velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftType {
    /// Average velocity above 0.3.
    Rapid,
    /// Average velocity above 0.1.
    Moderate,
    /// Everything else.
    Slow,
}

impl fmt::Display for DriftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DriftType::Rapid => "rapid",
            DriftType::Moderate => "moderate",
            DriftType::Slow => "slow",
        })
    }
}

/// One drift measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    /// Euclidean distance between the old and new topic vectors.
    pub magnitude: f64,
    /// Velocity grade.
    pub drift_type: DriftType,
    /// Smoothed per-dimension velocity after the update.
    pub velocity: [f64; TOPIC_DIMENSIONS],
    /// Operator-facing hint.
    pub hint: String,
}

/// Tracks the topic vector of one entity and the smoothed rate at which it
/// moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicDrift {
    vector: [f64; TOPIC_DIMENSIONS],
    velocity: [f64; TOPIC_DIMENSIONS],
}

impl Default for TopicDrift {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicDrift {
    /// Start tracking from the origin with zero velocity.
    pub fn new() -> Self {
        Self {
            vector: [0.0; TOPIC_DIMENSIONS],
            velocity: [0.0; TOPIC_DIMENSIONS],
        }
    }

    /// Start tracking from a known topic vector.
    pub fn with_vector(vector: [f64; TOPIC_DIMENSIONS]) -> Self {
        Self {
            vector,
            velocity: [0.0; TOPIC_DIMENSIONS],
        }
    }

    /// The current topic vector.
    pub fn vector(&self) -> [f64; TOPIC_DIMENSIONS] {
        self.vector
    }

    /// Fold in a new observation of the topic vector.
    ///
    /// Magnitude is the Euclidean distance between vectors; velocity is an
    /// EMA (alpha 0.3) of the per-dimension deltas.
    pub fn observe(&mut self, new_vector: [f64; TOPIC_DIMENSIONS], category: Category) -> DriftReport {
        let magnitude = self
            .vector
            .iter()
            .zip(new_vector.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt();

        for i in 0..TOPIC_DIMENSIONS {
            let delta = new_vector[i] - self.vector[i];
            self.velocity[i] = DRIFT_ALPHA * delta + (1.0 - DRIFT_ALPHA) * self.velocity[i];
        }
        self.vector = new_vector;

        let avg_velocity =
            self.velocity.iter().map(|v| v.abs()).sum::<f64>() / TOPIC_DIMENSIONS as f64;
        let drift_type = if avg_velocity > 0.3 {
            DriftType::Rapid
        } else if avg_velocity > 0.1 {
            DriftType::Moderate
        } else {
            DriftType::Slow
        };

        DriftReport {
            magnitude,
            drift_type,
            velocity: self.velocity,
            hint: drift_hint(drift_type, category),
        }
    }
}

fn drift_hint(drift_type: DriftType, category: Category) -> String {
    match drift_type {
        DriftType::Rapid => {
            format!("Rapid topic shift detected in {category} domain")
        }
        DriftType::Moderate => format!("Moderate drift - {category} agent adapting"),
        DriftType::Slow => format!("Stable {category} trajectory"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
