// Session module - the seam a front end drives
//
// This module contains:
// - SessionController: load/save/apply/backup/reset/refresh over one owned model
// - SessionError: failures a front end has to surface

pub mod controller;

pub use controller::{SessionController, SessionError};
