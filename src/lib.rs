//! screenfeed
//!
//! A display-capture input source for multi-consumer video-streaming hosts.
//! One dedicated worker repeatedly snapshots a display compositor,
//! JPEG-encodes the snapshot, and publishes it into a single-slot mailbox
//! that any number of consumers read; an orthogonal command interface
//! maintains a virtual pan/tilt pointing state for hosts that otherwise
//! drive camera motors.
//!
//! # Architecture
//!
//! Data flows one way: `DisplaySource` -> `JpegEncoder` -> `SharedSlot`.
//!
//! - `frame`: raw RGBA snapshot borrowed for one loop iteration
//! - `source`: the `Compositor` collaborator seam and `DisplaySource`
//! - `encode`: RGBA-to-JPEG with clamped quality
//! - `slot`: mutex + condvar latest-frame mailbox, notify-all on publish
//! - `worker`: the capture loop, its shutdown token, fault policy, and
//!   exactly-once source cleanup
//! - `control`: the mutex-guarded pan/tilt command state machine
//! - `config`: daemon settings (file + env layering)
//!
//! Consumers never talk to the capture path directly: they hold the
//! `SharedSlot` and either copy the latest frame out or wait for the next
//! publish. Stopping the worker closes the slot, which unblocks every
//! waiting consumer.

pub mod config;
pub mod control;
pub mod encode;
pub mod frame;
pub mod slot;
pub mod source;
pub mod worker;

pub use config::DaemonConfig;
pub use control::{
    Command, PanTiltController, MAX_PAN, MAX_TILT, MIN_PAN, MIN_TILT, ONE_DEGREE,
};
pub use encode::{JpegEncoder, MAX_QUALITY};
pub use frame::{RawFrame, BYTES_PER_PIXEL};
pub use slot::{EncodedFrame, SharedSlot};
pub use source::{
    compositor_from_url, Compositor, DisplayMode, DisplaySource, Rect, Rotation,
    SyntheticCompositor, SyntheticConfig, SyntheticStats,
};
pub use worker::{
    CaptureConfig, CaptureHandle, CaptureLoop, FaultPolicy, LoopStats, ShutdownToken,
};
