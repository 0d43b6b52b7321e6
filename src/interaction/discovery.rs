//! Structural UI discovery: which element, if any, a tick should tap.
//!
//! Each category maps to a bounded provider walk plus a pure picker over the
//! returned elements. A picker that finds nothing returns `None` and the
//! tick falls back to a geometric gesture.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::provider::{ElementHandle, RegionFilter, ScreenRegion};

/// Depth cap for every discovery walk.
pub const MAX_WALK_DEPTH: usize = 15;
/// Element cap for the unrestricted walk.
pub const MAX_ANY_ELEMENTS: usize = 50;
const MAX_BOTTOM_ELEMENTS: usize = 20;
const MAX_TOOLBAR_ELEMENTS: usize = 15;
const MAX_FAB_ELEMENTS: usize = 5;
/// Share of the screen height treated as the bottom-nav or toolbar strip.
const EDGE_STRIP: f32 = 0.15;

const UNSAFE_KEYWORDS: &[&str] = &["back", "close", "exit", "navigate up"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    BottomNav,
    FloatingAction,
    Toolbar,
    AnyElement,
    Fallback,
}

impl Category {
    /// Maps a roll in `0..100` to its category: 15% bottom nav, 10% floating
    /// action, 10% toolbar, 15% any element, 50% straight to the fallback.
    pub fn from_roll(roll: u32) -> Self {
        match roll {
            0..=14 => Category::BottomNav,
            15..=24 => Category::FloatingAction,
            25..=34 => Category::Toolbar,
            35..=49 => Category::AnyElement,
            _ => Category::Fallback,
        }
    }

    pub fn filter(self) -> Option<RegionFilter> {
        let filter = match self {
            Category::BottomNav => RegionFilter::anywhere(MAX_WALK_DEPTH, MAX_BOTTOM_ELEMENTS)
                .region(ScreenRegion::Bottom(EDGE_STRIP)),
            Category::FloatingAction => RegionFilter::anywhere(MAX_WALK_DEPTH, MAX_FAB_ELEMENTS)
                .class_hint("FloatingActionButton")
                .class_hint("FAB"),
            Category::Toolbar => RegionFilter::anywhere(MAX_WALK_DEPTH, MAX_TOOLBAR_ELEMENTS)
                .region(ScreenRegion::Top(EDGE_STRIP)),
            Category::AnyElement => RegionFilter::anywhere(MAX_WALK_DEPTH, MAX_ANY_ELEMENTS),
            Category::Fallback => return None,
        };
        Some(filter)
    }

    pub fn pick<'a, R: Rng + ?Sized>(
        self,
        elements: &'a [ElementHandle],
        rng: &mut R,
    ) -> Option<&'a ElementHandle> {
        match self {
            Category::BottomNav => pick_bottom_nav(elements, rng),
            Category::FloatingAction => elements.first(),
            Category::Toolbar | Category::AnyElement => pick_safe(elements, rng),
            Category::Fallback => None,
        }
    }
}

/// Text or description hints that tapping would leave the current screen.
pub fn is_unsafe(element: &ElementHandle) -> bool {
    let (text, description) = element.labels();
    UNSAFE_KEYWORDS
        .iter()
        .any(|keyword| text.contains(keyword) || description.contains(keyword))
}

fn looks_like_navigation(element: &ElementHandle) -> bool {
    let class_name = element.class_name.as_deref().unwrap_or_default();
    let (_, description) = element.labels();
    class_name.contains("Tab")
        || class_name.contains("BottomNavigationItemView")
        || description.contains("tab")
        || description.contains("navigation")
}

fn pick_bottom_nav<'a, R: Rng + ?Sized>(
    elements: &'a [ElementHandle],
    rng: &mut R,
) -> Option<&'a ElementHandle> {
    let nav: Vec<&ElementHandle> = elements.iter().filter(|e| looks_like_navigation(e)).collect();
    if nav.is_empty() {
        elements.choose(rng)
    } else {
        nav.choose(rng).copied()
    }
}

fn pick_safe<'a, R: Rng + ?Sized>(
    elements: &'a [ElementHandle],
    rng: &mut R,
) -> Option<&'a ElementHandle> {
    let safe: Vec<&ElementHandle> = elements.iter().filter(|e| !is_unsafe(e)).collect();
    safe.choose(rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Bounds;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn element(text: &str, description: &str, class_name: &str) -> ElementHandle {
        ElementHandle {
            bounds: Bounds::new(0, 0, 100, 100),
            text: Some(text.into()),
            description: Some(description.into()),
            class_name: Some(class_name.into()),
        }
    }

    #[test]
    fn test_roll_distribution_boundaries() {
        let counts = (0..100).fold([0usize; 5], |mut acc, roll| {
            let slot = match Category::from_roll(roll) {
                Category::BottomNav => 0,
                Category::FloatingAction => 1,
                Category::Toolbar => 2,
                Category::AnyElement => 3,
                Category::Fallback => 4,
            };
            acc[slot] += 1;
            acc
        });
        assert_eq!(counts, [15, 10, 10, 15, 50]);
    }

    #[test]
    fn test_walks_are_bounded() {
        for category in [
            Category::BottomNav,
            Category::FloatingAction,
            Category::Toolbar,
            Category::AnyElement,
        ] {
            let filter = category.filter().unwrap();
            assert!(filter.max_depth <= MAX_WALK_DEPTH);
            assert!(filter.max_results <= MAX_ANY_ELEMENTS);
        }
        assert!(Category::Fallback.filter().is_none());
    }

    #[test]
    fn test_unsafe_labels_are_never_picked() {
        let mut rng = StdRng::seed_from_u64(7);
        let elements = vec![
            element("Back", "", "android.widget.ImageButton"),
            element("", "Close dialog", "android.widget.ImageButton"),
            element("", "Navigate up", "android.widget.ImageButton"),
            element("Exit", "", "android.widget.Button"),
        ];

        for _ in 0..20 {
            assert!(Category::AnyElement.pick(&elements, &mut rng).is_none());
            assert!(Category::Toolbar.pick(&elements, &mut rng).is_none());
        }

        let mut with_safe = elements.clone();
        with_safe.push(element("Search", "", "android.widget.TextView"));
        for _ in 0..20 {
            let picked = Category::AnyElement.pick(&with_safe, &mut rng).unwrap();
            assert_eq!(picked.text.as_deref(), Some("Search"));
        }
    }

    #[test]
    fn test_bottom_nav_prefers_navigation_items() {
        let mut rng = StdRng::seed_from_u64(11);
        let elements = vec![
            element("Promo", "", "android.widget.Button"),
            element("", "Home tab", "android.widget.FrameLayout"),
        ];
        for _ in 0..20 {
            let picked = Category::BottomNav.pick(&elements, &mut rng).unwrap();
            assert_eq!(picked.description.as_deref(), Some("Home tab"));
        }

        let plain = vec![element("Promo", "", "android.widget.Button")];
        assert!(Category::BottomNav.pick(&plain, &mut rng).is_some());
        assert!(Category::BottomNav.pick(&[], &mut rng).is_none());
    }
}
