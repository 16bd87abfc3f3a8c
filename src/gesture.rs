//! Classification of button press/release pairs by hold time.

use embassy_time::{Duration, Instant};
use log::{debug, warn};

use crate::config::{GestureConfig, MAX_BUTTONS};
use crate::{AppError, ButtonId};

/// A level change on a button, as seen by the input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEdge {
    pub button: ButtonId,
    pub pressed: bool,
    pub timestamp: Instant,
}

impl ButtonEdge {
    pub fn press(button: ButtonId, timestamp: Instant) -> Self {
        Self {
            button,
            pressed: true,
            timestamp,
        }
    }

    pub fn release(button: ButtonId, timestamp: Instant) -> Self {
        Self {
            button,
            pressed: false,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureClass {
    Short,
    Medium,
    Long,
}

/// A completed press-hold-release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureEvent {
    pub button: ButtonId,
    pub hold_duration: Duration,
    pub class: GestureClass,
}

pub struct GestureClassifier {
    config: GestureConfig,
    /// Outstanding press per button, indexed by id.
    pressed_at: [Option<Instant>; MAX_BUTTONS],
}

impl GestureClassifier {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            pressed_at: [None; MAX_BUTTONS],
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// Lower bounds are closed: a hold of exactly `lower` is medium and one of
    /// exactly `upper` is long.
    pub fn classify(&self, hold: Duration) -> GestureClass {
        if hold < self.config.lower {
            GestureClass::Short
        } else if hold < self.config.upper {
            GestureClass::Medium
        } else {
            GestureClass::Long
        }
    }

    /// Feed one edge. Returns the gesture completed by a release, if any.
    ///
    /// Edges for a button must arrive in the order they happened. A second
    /// press without a release restarts the hold.
    pub fn on_edge(&mut self, edge: ButtonEdge) -> Result<Option<GestureEvent>, AppError> {
        let slot = self
            .pressed_at
            .get_mut(edge.button as usize)
            .ok_or(AppError::UnknownButton(edge.button))?;

        if edge.pressed {
            if slot.is_some() {
                debug!("button {}: press while held, restarting hold", edge.button);
            }
            *slot = Some(edge.timestamp);
            return Ok(None);
        }

        let Some(pressed_at) = slot.take() else {
            warn!("button {}: release without press, ignored", edge.button);
            return Err(AppError::SpuriousEdge(edge.button));
        };
        let hold_duration = edge
            .timestamp
            .checked_duration_since(pressed_at)
            .unwrap_or(Duration::from_ticks(0));
        let event = GestureEvent {
            button: edge.button,
            hold_duration,
            class: self.classify(hold_duration),
        };
        debug!(
            "button {}: {:?} after {} ms",
            event.button,
            event.class,
            hold_duration.as_millis()
        );
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> GestureClassifier {
        GestureClassifier::new(GestureConfig {
            lower: Duration::from_millis(2000),
            upper: Duration::from_millis(5000),
            factory_reset_extension: Duration::from_millis(5000),
        })
    }

    fn hold(classifier: &mut GestureClassifier, ms: u64) -> GestureEvent {
        let t0 = Instant::from_millis(10_000);
        assert_eq!(classifier.on_edge(ButtonEdge::press(0, t0)), Ok(None));
        classifier
            .on_edge(ButtonEdge::release(0, t0 + Duration::from_millis(ms)))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn thresholds_are_closed_lower_bounds() {
        let mut c = classifier();
        assert_eq!(hold(&mut c, 1999).class, GestureClass::Short);
        assert_eq!(hold(&mut c, 2000).class, GestureClass::Medium);
        assert_eq!(hold(&mut c, 4999).class, GestureClass::Medium);
        assert_eq!(hold(&mut c, 5000).class, GestureClass::Long);
    }

    #[test]
    fn reports_hold_duration() {
        let mut c = classifier();
        let event = hold(&mut c, 1234);
        assert_eq!(event.button, 0);
        assert_eq!(event.hold_duration, Duration::from_millis(1234));
    }

    #[test]
    fn release_without_press_is_spurious() {
        let mut c = classifier();
        let edge = ButtonEdge::release(1, Instant::from_millis(5));
        assert_eq!(c.on_edge(edge), Err(AppError::SpuriousEdge(1)));
    }

    #[test]
    fn release_consumes_the_press() {
        let mut c = classifier();
        hold(&mut c, 100);
        let edge = ButtonEdge::release(0, Instant::from_millis(20_000));
        assert_eq!(c.on_edge(edge), Err(AppError::SpuriousEdge(0)));
    }

    #[test]
    fn second_press_restarts_the_hold() {
        let mut c = classifier();
        c.on_edge(ButtonEdge::press(0, Instant::from_millis(0))).unwrap();
        c.on_edge(ButtonEdge::press(0, Instant::from_millis(4000))).unwrap();
        let event = c
            .on_edge(ButtonEdge::release(0, Instant::from_millis(5000)))
            .unwrap()
            .unwrap();
        assert_eq!(event.class, GestureClass::Short);
    }

    #[test]
    fn buttons_are_tracked_independently() {
        let mut c = classifier();
        c.on_edge(ButtonEdge::press(0, Instant::from_millis(0))).unwrap();
        c.on_edge(ButtonEdge::press(1, Instant::from_millis(3000))).unwrap();
        let first = c
            .on_edge(ButtonEdge::release(1, Instant::from_millis(3500)))
            .unwrap()
            .unwrap();
        let second = c
            .on_edge(ButtonEdge::release(0, Instant::from_millis(6000)))
            .unwrap()
            .unwrap();
        assert_eq!((first.button, first.class), (1, GestureClass::Short));
        assert_eq!((second.button, second.class), (0, GestureClass::Long));
    }

    #[test]
    fn unknown_button_is_rejected() {
        let mut c = classifier();
        let edge = ButtonEdge::press(MAX_BUTTONS as ButtonId, Instant::from_millis(0));
        assert_eq!(
            c.on_edge(edge),
            Err(AppError::UnknownButton(MAX_BUTTONS as ButtonId))
        );
    }
}
