//! The library code for `sitedex`, which builds a local full-text search
//! index for a markdown static site. The architecture can be generally broken
//! down into three distinct steps:
//!
//! 1. Enumerating the site's pages on disk ([`crate::content`])
//! 2. Converting each page into index records ([`crate::document`])
//! 3. Collecting the records into one index per locale and writing them out
//!    as artifacts ([`crate::index`])
//!
//! [`crate::builder`] drives the three steps with bounded concurrency and
//! tells listeners when a new index is available; [`crate::watch`] re-runs it
//! whenever a page changes.
//!
//! The second step is the more involved. A page is rendered to HTML through a
//! [`crate::markdown::Renderer`], which also recovers its front matter, and
//! the HTML is cut into one section per anchored heading
//! ([`crate::sections`]). Each section becomes a record whose text has been
//! stripped of markup ([`crate::text`]) and whose id is the page URL plus the
//! heading's anchor.
//!
//! The remaining modules are post-processing the site generator needs
//! alongside the index: code block titles for icon generation
//! ([`crate::icons`]), the flash-of-unstyled-content guard ([`crate::fouc`])
//! and `llms.txt` ([`crate::llms`]).

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod builder;
pub mod config;
pub mod content;
pub mod document;
pub mod fouc;
pub mod frontmatter;
pub mod icons;
pub mod index;
pub mod llms;
pub mod markdown;
pub mod sections;
pub mod text;
pub mod watch;
