// Copyright 2026 Streamprobe Contributors
// SPDX-License-Identifier: Apache-2.0

//! streamprobe — locate streaming manifests behind dynamic video pages.
//!
//! A status request for a search result id starts a background job that
//! opens the page in an isolated headless browser, watches its network
//! traffic and media elements for HLS playlists, and records the outcome in
//! a pollable registry.

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod extractor;
pub mod poller;
pub mod registry;
pub mod renderer;
pub mod rest;
pub mod scheduler;
pub mod server;
