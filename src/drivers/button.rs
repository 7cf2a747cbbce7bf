//! Polled, debounced front-panel buttons.
//!
//! ## Hardware
//!
//! Three active-low momentary switches with pull-ups.  A poller thread
//! samples every line at a fixed period, runs each through a
//! [`Debouncer`], and queues one [`ButtonEvent`] per accepted press edge
//! on a `crossbeam` channel.  The tick loop drains the queue through
//! [`ButtonQueue`], so no press is lost between ticks and none is seen
//! twice.
//!
//! ## Debounce
//!
//! | Edge            | Accepted when                                   |
//! |-----------------|-------------------------------------------------|
//! | press (falling) | ≥ debounce since the last accepted edge         |
//! | release         | ≥ debounce since the last accepted edge         |
//!
//! Only accepted press edges produce an event.

use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use embedded_hal::digital::InputPin;
use log::{debug, info, warn};

use crate::app::ports::{ButtonSource, Clock};
use crate::fsm::overrides::{Button, ButtonEvent};
use crate::fsm::timer::Timestamp;

// ---------------------------------------------------------------------------
// Debouncer
// ---------------------------------------------------------------------------

/// Level-based debouncer producing press edges.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    pressed: bool,
    last_edge: Option<Timestamp>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pressed: false,
            last_edge: None,
        }
    }

    /// Feed the raw "is pressed" level.  Returns `true` on an accepted
    /// press edge.
    pub fn update(&mut self, pressed: bool, now: Timestamp) -> bool {
        if pressed == self.pressed {
            return false;
        }
        if self
            .last_edge
            .is_some_and(|last| now.saturating_since(last) < self.window)
        {
            return false;
        }
        self.pressed = pressed;
        self.last_edge = Some(now);
        pressed
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }
}

// ---------------------------------------------------------------------------
// One button line
// ---------------------------------------------------------------------------

pub struct ButtonInput<P: InputPin> {
    button: Button,
    pin: P,
    debouncer: Debouncer,
    /// Last read error, so a dead line is logged once.
    failing: bool,
}

impl<P: InputPin> ButtonInput<P> {
    pub fn new(button: Button, pin: P, debounce: Duration) -> Self {
        Self {
            button,
            pin,
            debouncer: Debouncer::new(debounce),
            failing: false,
        }
    }

    /// Sample the line once.  Read errors count as "not pressed".
    pub fn poll(&mut self, now: Timestamp) -> Option<ButtonEvent> {
        let pressed = match self.pin.is_low() {
            Ok(low) => {
                if self.failing {
                    info!("Button {:?} line readable again", self.button);
                    self.failing = false;
                }
                low
            }
            Err(e) => {
                if !self.failing {
                    warn!("Button {:?} read failed: {e:?}", self.button);
                    self.failing = true;
                }
                false
            }
        };
        self.debouncer
            .update(pressed, now)
            .then(|| ButtonEvent::new(self.button, now))
    }
}

// ---------------------------------------------------------------------------
// Queue (tick-loop side)
// ---------------------------------------------------------------------------

/// Receiving end of the button channel.
pub struct ButtonQueue {
    rx: Receiver<ButtonEvent>,
}

impl ButtonQueue {
    /// A fresh queue and the sender that feeds it.
    pub fn channel() -> (Sender<ButtonEvent>, Self) {
        let (tx, rx) = channel::unbounded();
        (tx, Self { rx })
    }
}

impl ButtonSource for ButtonQueue {
    fn drain_events(&mut self) -> Vec<ButtonEvent> {
        self.rx.try_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// Poller thread
// ---------------------------------------------------------------------------

/// Background thread sampling every button line.
pub struct ButtonPoller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ButtonPoller {
    pub fn spawn<P, C>(
        mut inputs: Vec<ButtonInput<P>>,
        clock: C,
        period: Duration,
        tx: Sender<ButtonEvent>,
    ) -> std::io::Result<Self>
    where
        P: InputPin + Send + 'static,
        C: Clock + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("buttons".into())
            .spawn(move || {
                info!("Button poller running every {period:?}");
                while !stop_flag.load(Ordering::Relaxed) {
                    let now = clock.now();
                    for input in &mut inputs {
                        if let Some(ev) = input.poll(now) {
                            debug!("Button {:?} pressed", ev.button);
                            if tx.send(ev).is_err() {
                                return;
                            }
                        }
                    }
                    thread::sleep(period);
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Button poller thread panicked");
            }
        }
    }
}

impl Drop for ButtonPoller {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
