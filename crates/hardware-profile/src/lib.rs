// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # hardware-profile
//!
//! Describes the memory and compute available to the upscaling engine.
//!
//! The engine takes a [`HardwareProfile`] at construction and derives its
//! per-resource budgets from it. Host detection reads `/proc/meminfo`; GPU
//! discovery belongs to whoever owns the device and is reported through
//! [`HardwareProfile::with_gpu`].
//!
//! # Example
//! ```no_run
//! use hardware_profile::HardwareProfile;
//!
//! let profile = HardwareProfile::detect_host()
//!     .expect("failed to read host memory")
//!     .with_gpu(3 * 1024 * 1024 * 1024);
//! println!("{}", profile.summary());
//! ```

mod error;
mod memory;
mod profile;

pub use error::ProfileError;
pub use memory::HostMemory;
pub use profile::HardwareProfile;
