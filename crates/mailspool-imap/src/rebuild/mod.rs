//! Partial message download and reconstruction.
//!
//! Pulling a whole message is wasteful when only its text matters.
//! The flow here goes: fetch the `BODYSTRUCTURE`, flatten it with
//! [`collect_parts`], turn the wanted parts into a FETCH item list
//! with [`plan_fetch`], run the fetch, then weld the returned
//! sections back into one RFC 822 message with [`assemble`]. The
//! result parses with any MIME library even though most of its bytes
//! never crossed the wire.
//!
//! ```
//! use mailspool_imap::rebuild::{TextMode, collect_parts, plan_fetch};
//! use mailspool_imap::BodyStructure;
//!
//! let structure = BodyStructure {
//!     content_type: "text".to_string(),
//!     content_subtype: "plain".to_string(),
//!     ..BodyStructure::default()
//! };
//! let parts = collect_parts(&structure);
//! let plan = plan_fetch(&parts, TextMode::Plain, true, false);
//! assert_eq!(plan.items, "(BODY.PEEK[])");
//! ```

mod assemble;
mod parts;
mod plan;

pub use assemble::{assemble, envelope_header, part_header};
pub use parts::{Part, collect_parts, has_attachment, is_inline_html, is_inline_text, text_size};
pub use plan::{FetchPlan, TextMode, plan_fetch};
