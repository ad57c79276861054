//! Pipeline stages for score retrieval.
//!
//! Each submodule implements one step and depends only on the previous
//! step's output plus the format selector. No stage keeps state beyond the
//! request it serves.
//!
//! ## Data Flow
//!
//! ```text
//! locate ──▶ page ──▶ resolve ──▶ fetch ──▶ (assemble) ──▶ output
//! (URL→id)   (GET)    (addresses) (GETs)    (SVG→PDF)
//!                        ▲
//!                 pagination (pdf only)
//! ```
//!
//! 1. [`locate`]:     score URL to [`locate::ScoreIdentity`]
//! 2. [`page`]:       one GET of the score page, parsed into a
//!    [`crate::document::ScoreDocument`]
//! 3. [`pagination`]: page count for the paginated format, computed once
//!    before any page is fetched
//! 4. [`resolve`]:    deterministic retrieval addresses per format
//! 5. [`fetch`]:      sequential or bounded-parallel retrieval into scratch
//!    space
//! 6. [`assemble`]:   SVG pages rasterised and composed into one PDF; runs
//!    in `spawn_blocking`
//!
//! [`dataset`] replaces steps 3–6 when artifacts come from the
//! content-addressed dataset instead of the page. [`sanitize`] turns titles
//! into file names.

pub mod assemble;
pub mod dataset;
pub mod fetch;
pub mod locate;
pub mod page;
pub mod pagination;
pub mod resolve;
pub mod sanitize;
