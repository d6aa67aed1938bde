//! Exercise identities, detector counter snapshots and pose landmarks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Counter keys reported by the pose detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKey {
    PushUp,
    Squat,
    JumpingJack,
    ArmCircle,
    Burpee,
    MountainClimber,
    HighKnee,
    Lunge,
    Plank,
    JumpSquat,
    StarJump,
}

impl ExerciseKey {
    /// Keys the detector reports on every frame
    pub const TRACKED: [ExerciseKey; 4] = [
        ExerciseKey::PushUp,
        ExerciseKey::Squat,
        ExerciseKey::JumpingJack,
        ExerciseKey::ArmCircle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseKey::PushUp => "push_up",
            ExerciseKey::Squat => "squat",
            ExerciseKey::JumpingJack => "jumping_jack",
            ExerciseKey::ArmCircle => "arm_circle",
            ExerciseKey::Burpee => "burpee",
            ExerciseKey::MountainClimber => "mountain_climber",
            ExerciseKey::HighKnee => "high_knee",
            ExerciseKey::Lunge => "lunge",
            ExerciseKey::Plank => "plank",
            ExerciseKey::JumpSquat => "jump_squat",
            ExerciseKey::StarJump => "star_jump",
        }
    }

    /// Resolve a human exercise name ("Push-ups", "Jumping Jacks", "Plank Hold")
    /// to the detector key that counts it.
    pub fn from_exercise_name(name: &str) -> Option<Self> {
        let normalized = normalize_name(name);
        if let Ok(key) = normalized.parse() {
            return Some(key);
        }

        // Plurals: "squats" -> "squat", "push_ups" -> "push_up"
        if let Some(singular) = normalized.strip_suffix('s') {
            if let Ok(key) = singular.parse() {
                return Some(key);
            }
        }

        match normalized.as_str() {
            "plank_hold" => Some(ExerciseKey::Plank),
            "pushup" | "pushups" => Some(ExerciseKey::PushUp),
            _ => None,
        }
    }
}

impl fmt::Display for ExerciseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExerciseKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push_up" => Ok(ExerciseKey::PushUp),
            "squat" => Ok(ExerciseKey::Squat),
            "jumping_jack" => Ok(ExerciseKey::JumpingJack),
            "arm_circle" => Ok(ExerciseKey::ArmCircle),
            "burpee" => Ok(ExerciseKey::Burpee),
            "mountain_climber" => Ok(ExerciseKey::MountainClimber),
            "high_knee" => Ok(ExerciseKey::HighKnee),
            "lunge" => Ok(ExerciseKey::Lunge),
            "plank" => Ok(ExerciseKey::Plank),
            "jump_squat" => Ok(ExerciseKey::JumpSquat),
            "star_jump" => Ok(ExerciseKey::StarJump),
            other => Err(format!("unknown exercise key '{}'", other)),
        }
    }
}

/// Lowercase, collapse every run of non-alphanumerics into one `_`
fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Total reps per exercise detected so far in the session.
///
/// Deserializes from the detector's `{ "squat": 3, ... }` map; keys the crate
/// does not know are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, u32>", into = "BTreeMap<String, u32>")]
pub struct CounterSnapshot {
    counts: BTreeMap<ExerciseKey, u32>,
}

impl CounterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// All tracked counters at zero
    pub fn zeroed() -> Self {
        Self {
            counts: ExerciseKey::TRACKED.iter().map(|key| (*key, 0)).collect(),
        }
    }

    pub fn with(mut self, key: ExerciseKey, count: u32) -> Self {
        self.counts.insert(key, count);
        self
    }

    /// Count for `key`; a missing key reads as zero
    pub fn get(&self, key: ExerciseKey) -> u32 {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExerciseKey, u32)> + '_ {
        self.counts.iter().map(|(key, count)| (*key, *count))
    }
}

impl From<BTreeMap<String, u32>> for CounterSnapshot {
    fn from(raw: BTreeMap<String, u32>) -> Self {
        let counts = raw
            .into_iter()
            .filter_map(|(key, count)| key.parse::<ExerciseKey>().ok().map(|k| (k, count)))
            .collect();
        Self { counts }
    }
}

impl From<CounterSnapshot> for BTreeMap<String, u32> {
    fn from(snapshot: CounterSnapshot) -> Self {
        snapshot
            .counts
            .into_iter()
            .map(|(key, count)| (key.as_str().to_string(), count))
            .collect()
    }
}

/// A single pose landmark in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default)]
    pub visibility: f32,
}
