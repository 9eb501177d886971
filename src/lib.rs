// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
// Documentation
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Clone / pass-by-value hygiene
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::implicit_clone)]
// String hygiene
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::redundant_closure_for_method_calls)]
#![deny(clippy::manual_string_new)]
#![deny(clippy::str_to_string)]
// Cargo lints (warn, not deny since cargo lints can be noisy)
#![warn(clippy::cargo)]
// Unused / redundant code
#![deny(unused_results)]
#![deny(unused_qualifications)]
// Cast hygiene
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]

//! GPU-accelerated deformable figure posing engine built on wgpu.
//!
//! Anima computes, every frame, the posed vertex positions and per-vertex
//! ambient-occlusion data of hierarchically composed figures (a main body
//! plus attached clothing/hair/prop figures) on the GPU, propagating
//! occlusion between parent and child figures and exposing a throttled,
//! double-buffered CPU readback of the previous frame's posed vertices.
//!
//! # Key entry points
//!
//! - [`figure::ControlVertexProvider`] - the per-figure pipeline controller
//! - [`figure::FigureModel`] - shape/visibility state with change events
//! - [`gpu::ComputeContext`] - headless wgpu device and queue
//! - [`options::PosingOptions`] - runtime configuration
//!
//! # Architecture
//!
//! Each figure instance owns a [`figure::GpuShaper`] (channel outputs + bone
//! transforms → positions), an [`figure::Occluder`] (computed live for the
//! main figure, baked for attachments), and a storage-buffer vertex store.
//! Parents aggregate the occluders of their currently visible children via
//! fan-in change notifications. The main figure stages its vertex store into
//! a two-deep readback ring so CPU consumers can observe the previous
//! frame's results without ever stalling the GPU command stream.

pub mod assets;
pub mod error;
pub mod figure;
pub mod gpu;
pub mod options;
pub mod pose;
