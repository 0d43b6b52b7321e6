use rand::Rng;

use crate::provider::{ScreenInteractionProvider, ScreenSize};

const SCROLL_DURATION_MS: u64 = 400;
const SWIPE_DURATION_MS: u64 = 200;

/// A concrete gesture in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    Tap {
        x: f32,
        y: f32,
    },
    Swipe {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        duration_ms: u64,
    },
}

impl Gesture {
    pub async fn dispatch(&self, provider: &dyn ScreenInteractionProvider) -> bool {
        match *self {
            Gesture::Tap { x, y } => provider.tap(x, y).await,
            Gesture::Swipe {
                x1,
                y1,
                x2,
                y2,
                duration_ms,
            } => provider.swipe(x1, y1, x2, y2, duration_ms).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    SafeTap,
    ScrollDown,
    ScrollUp,
    SwipeLeft,
}

impl FallbackKind {
    /// Maps a roll in `0..10`: 40% tap, 30% scroll down, 20% scroll up,
    /// 10% swipe left.
    pub fn from_roll(roll: u32) -> Self {
        match roll {
            0..=3 => FallbackKind::SafeTap,
            4..=6 => FallbackKind::ScrollDown,
            7..=8 => FallbackKind::ScrollUp,
            _ => FallbackKind::SwipeLeft,
        }
    }
}

/// Builds the geometric gesture for `kind`. Taps land in the central safe
/// zone, clear of the status bar, screen edges and the top-right overlay
/// control.
pub fn fallback_gesture<R: Rng + ?Sized>(
    kind: FallbackKind,
    screen: ScreenSize,
    rng: &mut R,
) -> Gesture {
    // A degenerate screen still needs a non-empty tap range.
    let width = screen.width.max(1) as f32;
    let height = screen.height.max(1) as f32;

    match kind {
        FallbackKind::SafeTap => {
            let x = rng.gen_range(width * 0.2..width * 0.7).floor();
            let y = rng.gen_range(height * 0.25..height * 0.8).floor();
            Gesture::Tap { x, y }
        }
        FallbackKind::ScrollDown => Gesture::Swipe {
            x1: width / 2.0,
            y1: height * 0.7,
            x2: width / 2.0,
            y2: height * 0.3,
            duration_ms: SCROLL_DURATION_MS,
        },
        FallbackKind::ScrollUp => Gesture::Swipe {
            x1: width / 2.0,
            y1: height * 0.3,
            x2: width / 2.0,
            y2: height * 0.7,
            duration_ms: SCROLL_DURATION_MS,
        },
        FallbackKind::SwipeLeft => Gesture::Swipe {
            x1: width * 0.7,
            y1: height * 0.5,
            x2: width * 0.3,
            y2: height * 0.5,
            duration_ms: SWIPE_DURATION_MS,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fallback_roll_distribution() {
        let kinds: Vec<FallbackKind> = (0..10).map(FallbackKind::from_roll).collect();
        let count = |kind| kinds.iter().filter(|k| **k == kind).count();
        assert_eq!(count(FallbackKind::SafeTap), 4);
        assert_eq!(count(FallbackKind::ScrollDown), 3);
        assert_eq!(count(FallbackKind::ScrollUp), 2);
        assert_eq!(count(FallbackKind::SwipeLeft), 1);
    }

    #[test]
    fn test_safe_taps_stay_in_central_zone() {
        let screen = ScreenSize::new(1080, 2400);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..500 {
            let Gesture::Tap { x, y } = fallback_gesture(FallbackKind::SafeTap, screen, &mut rng)
            else {
                panic!("safe tap must be a tap");
            };
            assert!((216.0..756.0).contains(&x), "x={x}");
            assert!((600.0..1920.0).contains(&y), "y={y}");
        }
    }

    #[test]
    fn test_zero_sized_screen_still_yields_a_tap() {
        let mut rng = StdRng::seed_from_u64(7);
        let gesture = fallback_gesture(FallbackKind::SafeTap, ScreenSize::new(0, 0), &mut rng);
        assert!(matches!(gesture, Gesture::Tap { x, y } if x >= 0.0 && y >= 0.0));
    }

    #[test]
    fn test_scrolls_are_vertical_and_opposite() {
        let screen = ScreenSize::new(1000, 2000);
        let mut rng = StdRng::seed_from_u64(5);

        let down = fallback_gesture(FallbackKind::ScrollDown, screen, &mut rng);
        let up = fallback_gesture(FallbackKind::ScrollUp, screen, &mut rng);
        assert_eq!(
            down,
            Gesture::Swipe {
                x1: 500.0,
                y1: 1400.0,
                x2: 500.0,
                y2: 600.0,
                duration_ms: 400
            }
        );
        assert_eq!(
            up,
            Gesture::Swipe {
                x1: 500.0,
                y1: 600.0,
                x2: 500.0,
                y2: 1400.0,
                duration_ms: 400
            }
        );
    }
}
