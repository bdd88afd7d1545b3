//! # Beadboard
//!
//! A unified, read-only view of the beads spread across every rig in a town.
//!
//! Each rig keeps its own beads directory, queried through the `bd` CLI.
//! Beadboard works out which directories exist and which identifier prefix
//! belongs to which, fans list queries out to all of them concurrently, and
//! serves the merged result as a JSON API for the dashboard.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐   ┌──────────────┐
//! │ routes.jsonl │──▶│ SourceRegistry │──▶│  Aggregator  │──▶ bd list / bd show
//! │  + rig scan  │   │ prefix → dir   │   │  (fan-out)   │    (one per rig)
//! └──────────────┘   └────────────────┘   └──────┬───────┘
//!                                                │
//!                          ┌─────────────┐   ┌───▼────┐
//!                          │ ConfigStore │──▶│  HTTP  │
//!                          └─────────────┘   └────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! beadboard                      # discover the town, serve on localhost:9292
//! beadboard --town ~/gt sources  # show which rigs were found
//! beadboard list --status open   # merged listing on stdout
//! beadboard show ri-abc          # one bead, routed by prefix
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`town`] | Town root discovery |
//! | [`routes`] | `routes.jsonl` parsing and rig display names |
//! | [`registry`] | Prefix → beads directory routing |
//! | [`tool`] | `bd` / `gt` subprocess execution |
//! | [`aggregate`] | Concurrent cross-rig queries |
//! | [`config`] | Dashboard config store |
//! | [`sources`] | Rig listing |
//! | [`server`] | HTTP API |

pub mod aggregate;
pub mod config;
pub mod registry;
pub mod routes;
pub mod server;
pub mod sources;
pub mod tool;
pub mod town;
