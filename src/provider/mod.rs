//! The screen interaction boundary.
//!
//! Everything the engine does to the device goes through
//! [`ScreenInteractionProvider`]: foreground queries, UI element discovery,
//! gesture dispatch and global navigation. The engine never talks to the
//! platform directly, so tests can swap in a scripted provider.

pub mod adb;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use adb::AdbProvider;

/// Display dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) as f32 / 2.0,
            (self.top + self.bottom) as f32 / 2.0,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }
}

/// An interactable (clickable, visible, enabled) element on screen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ElementHandle {
    pub bounds: Bounds,
    pub text: Option<String>,
    pub description: Option<String>,
    pub class_name: Option<String>,
}

impl ElementHandle {
    /// Lower-cased text and description, for keyword matching.
    pub fn labels(&self) -> (String, String) {
        (
            self.text.as_deref().unwrap_or_default().to_lowercase(),
            self.description.as_deref().unwrap_or_default().to_lowercase(),
        )
    }

    pub fn label(&self) -> &str {
        self.text
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.description.as_deref())
            .unwrap_or("?")
    }
}

/// Which part of the screen a discovery walk should keep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScreenRegion {
    Anywhere,
    /// Element centre lies above `fraction × height`.
    Top(f32),
    /// Element centre lies below `(1 − fraction) × height`.
    Bottom(f32),
}

/// Bounds a discovery walk. Providers must stop descending past `max_depth`
/// and stop collecting once `max_results` elements are found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionFilter {
    pub region: ScreenRegion,
    pub class_hints: Vec<String>,
    pub max_depth: usize,
    pub max_results: usize,
}

impl RegionFilter {
    pub fn anywhere(max_depth: usize, max_results: usize) -> Self {
        Self {
            region: ScreenRegion::Anywhere,
            class_hints: Vec::new(),
            max_depth,
            max_results,
        }
    }

    pub fn region(mut self, region: ScreenRegion) -> Self {
        self.region = region;
        self
    }

    pub fn class_hint(mut self, hint: impl Into<String>) -> Self {
        self.class_hints.push(hint.into());
        self
    }

    /// Whether `element` satisfies the region and class constraints.
    /// Depth and result caps are the walker's job.
    pub fn matches(&self, element: &ElementHandle, screen: ScreenSize) -> bool {
        if element.bounds.is_empty() {
            return false;
        }

        let (_, center_y) = element.bounds.center();
        let height = screen.height as f32;
        let in_region = match self.region {
            ScreenRegion::Anywhere => true,
            ScreenRegion::Top(fraction) => center_y < height * fraction,
            ScreenRegion::Bottom(fraction) => center_y > height * (1.0 - fraction),
        };
        if !in_region {
            return false;
        }

        if self.class_hints.is_empty() {
            return true;
        }

        let class_name = element.class_name.as_deref().unwrap_or_default();
        self.class_hints
            .iter()
            .any(|hint| class_name.contains(hint.as_str()))
    }
}

/// Capability interface over the device.
///
/// Gesture and navigation calls report whether the platform accepted the
/// dispatch; they do not wait for the gesture to finish.
#[async_trait]
pub trait ScreenInteractionProvider: Send + Sync {
    /// Lifecycle check; an unavailable provider cannot dispatch gestures.
    fn is_available(&self) -> bool {
        true
    }

    async fn has_foreground_query_capability(&self) -> bool;

    async fn query_foreground_package(&self) -> Option<String>;

    async fn screen_size(&self) -> ScreenSize;

    async fn list_interactable_elements(&self, filter: &RegionFilter) -> Vec<ElementHandle>;

    async fn tap(&self, x: f32, y: f32) -> bool;

    async fn swipe(&self, x1: f32, y1: f32, x2: f32, y2: f32, duration_ms: u64) -> bool;

    async fn dispatch_back(&self) -> bool;

    async fn dispatch_home(&self) -> bool {
        false
    }

    async fn launch(&self, package_id: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(top: i32, bottom: i32, class_name: &str) -> ElementHandle {
        ElementHandle {
            bounds: Bounds::new(0, top, 100, bottom),
            class_name: Some(class_name.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_region_matching_uses_center() {
        let screen = ScreenSize::new(1000, 1000);
        let bottom = RegionFilter::anywhere(15, 20).region(ScreenRegion::Bottom(0.15));
        let top = RegionFilter::anywhere(15, 15).region(ScreenRegion::Top(0.15));

        assert!(bottom.matches(&element(900, 1000, "View"), screen));
        assert!(!bottom.matches(&element(800, 880, "View"), screen));
        assert!(top.matches(&element(0, 100, "View"), screen));
        assert!(!top.matches(&element(100, 300, "View"), screen));
    }

    #[test]
    fn test_class_hints_and_empty_bounds() {
        let screen = ScreenSize::new(1000, 1000);
        let fab = RegionFilter::anywhere(15, 5).class_hint("FloatingActionButton");

        assert!(fab.matches(
            &element(500, 600, "com.google.android.material.FloatingActionButton"),
            screen
        ));
        assert!(!fab.matches(&element(500, 600, "android.widget.Button"), screen));
        assert!(!RegionFilter::anywhere(15, 50).matches(&element(600, 600, "View"), screen));
    }
}
