// SPDX-License-Identifier: AGPL-3.0-only

//! Input/output: token configuration, phase-space files, output plug-ins.

pub mod config;
pub mod phase_space;
pub mod writers;
