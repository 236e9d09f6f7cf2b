//! Circle selection and the depth ladder.

use govern_core::Focus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Focus configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    /// Circles in rotation order
    pub circles: Vec<String>,
    /// Depth added on top of the base depth, per circle
    pub depth_offsets: BTreeMap<String, i32>,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            circles: ["analyst", "assessor", "innovator", "intuitive", "orchestrator", "seeker"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            depth_offsets: [("orchestrator", 1), ("assessor", 2)]
                .iter()
                .map(|(c, d)| (c.to_string(), *d))
                .collect(),
        }
    }
}

/// Strategy for choosing the circle of an iteration.
pub trait CircleSelector: Send + Sync {
    /// Circle for 1-based `iteration`.
    fn select(&self, iteration: u32) -> String;

    /// Short name recorded with each selection.
    fn mode(&self) -> &'static str;
}

/// Always the same circle.
#[derive(Debug, Clone)]
pub struct FixedCircle(pub String);

impl CircleSelector for FixedCircle {
    fn select(&self, _iteration: u32) -> String {
        self.0.clone()
    }

    fn mode(&self) -> &'static str {
        "fixed"
    }
}

/// Round-robin over a list.
#[derive(Debug, Clone)]
pub struct RotatingCircles(pub Vec<String>);

impl CircleSelector for RotatingCircles {
    fn select(&self, iteration: u32) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let idx = iteration.saturating_sub(1) as usize % self.0.len();
        self.0[idx].clone()
    }

    fn mode(&self) -> &'static str {
        "rotate"
    }
}

/// The first circle of a list.
#[derive(Debug, Clone)]
pub struct DefaultCircle(pub Vec<String>);

impl CircleSelector for DefaultCircle {
    fn select(&self, _iteration: u32) -> String {
        self.0.first().cloned().unwrap_or_default()
    }

    fn mode(&self) -> &'static str {
        "default"
    }
}

/// Circle selection policies.
#[derive(Debug, Clone)]
pub enum FocusPolicy {
    /// One circle for every iteration
    Fixed(FixedCircle),
    /// Rotate through the circle list
    Rotate(RotatingCircles),
    /// First circle of the list
    Default(DefaultCircle),
}

impl FocusPolicy {
    /// Policy for run options: an explicit circle wins, then rotation.
    pub fn from_options(circle: Option<String>, rotate: bool, circles: Vec<String>) -> Self {
        match circle {
            Some(circle) => FocusPolicy::Fixed(FixedCircle(circle)),
            None if rotate => FocusPolicy::Rotate(RotatingCircles(circles)),
            None => FocusPolicy::Default(DefaultCircle(circles)),
        }
    }
}

impl CircleSelector for FocusPolicy {
    fn select(&self, iteration: u32) -> String {
        match self {
            Self::Fixed(s) => s.select(iteration),
            Self::Rotate(s) => s.select(iteration),
            Self::Default(s) => s.select(iteration),
        }
    }

    fn mode(&self) -> &'static str {
        match self {
            Self::Fixed(s) => s.mode(),
            Self::Rotate(s) => s.mode(),
            Self::Default(s) => s.mode(),
        }
    }
}

/// A selection with the data its audit events need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Chosen focus
    pub focus: Focus,
    /// Policy mode
    pub mode: &'static str,
    /// Depth before the ladder offset
    pub base_depth: u32,
}

/// Chooses the circle and depth for each iteration.
pub struct FocusSelector {
    policy: FocusPolicy,
    base_depth: u32,
    offsets: BTreeMap<String, i32>,
}

impl FocusSelector {
    /// Create a selector.
    pub fn new(policy: FocusPolicy, base_depth: u32, offsets: BTreeMap<String, i32>) -> Self {
        Self {
            policy,
            base_depth,
            offsets,
        }
    }

    /// Depth for `circle`, never below zero.
    pub fn depth_for(&self, circle: &str) -> u32 {
        let offset = self.offsets.get(circle).copied().unwrap_or(0);
        (i64::from(self.base_depth) + i64::from(offset)).max(0) as u32
    }

    /// Select the focus for 1-based `iteration`.
    pub fn select(&self, iteration: u32) -> Selection {
        let circle = self.policy.select(iteration);
        let depth = self.depth_for(&circle);
        Selection {
            focus: Focus { circle, depth },
            mode: self.policy.mode(),
            base_depth: self.base_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(circle: Option<&str>, rotate: bool) -> FocusSelector {
        let config = FocusConfig::default();
        FocusSelector::new(
            FocusPolicy::from_options(circle.map(String::from), rotate, config.circles),
            3,
            config.depth_offsets,
        )
    }

    #[test]
    fn test_rotation_wraps() {
        let s = selector(None, true);
        let circles: Vec<_> = (1..=7).map(|i| s.select(i).focus.circle).collect();
        assert_eq!(
            circles,
            vec!["analyst", "assessor", "innovator", "intuitive", "orchestrator", "seeker", "analyst"]
        );
        assert_eq!(s.select(1).mode, "rotate");
    }

    #[test]
    fn test_fixed_circle_wins_over_rotation() {
        let s = selector(Some("seeker"), true);
        assert_eq!(s.select(4).focus.circle, "seeker");
        assert_eq!(s.select(4).mode, "fixed");
    }

    #[test]
    fn test_default_is_first_circle() {
        let s = selector(None, false);
        assert_eq!(s.select(5).focus.circle, "analyst");
        assert_eq!(s.select(5).mode, "default");
    }

    #[test]
    fn test_depth_ladder() {
        let s = selector(None, true);
        assert_eq!(s.depth_for("orchestrator"), 4);
        assert_eq!(s.depth_for("assessor"), 5);
        assert_eq!(s.depth_for("innovator"), 3);
        assert_eq!(s.select(2).focus.depth, 5);
    }

    #[test]
    fn test_negative_offset_clamps_at_zero() {
        let mut offsets = BTreeMap::new();
        offsets.insert("seeker".to_string(), -10);
        let s = FocusSelector::new(FocusPolicy::Fixed(FixedCircle("seeker".into())), 3, offsets);
        assert_eq!(s.select(1).focus.depth, 0);
    }

    #[test]
    fn test_offsets_from_toml() {
        let config: FocusConfig = toml::from_str(
            r#"
            circles = ["a", "b"]
            [depth_offsets]
            b = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.circles, vec!["a", "b"]);
        assert_eq!(config.depth_offsets.get("b"), Some(&2));
    }
}
