//! UI layer for the desktop GUI: app shell and panels.

pub mod app;

pub use app::{FaceMaskApp, PersistedSettings, SETTINGS_STORAGE_KEY};
