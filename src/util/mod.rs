//! Utility functions shared by the ingestion pipeline and the subscription graph.
//!
//! - **URL validation**: feed URLs must be absolute `http`/`https` URLs
//! - **Text normalization**: HTML entity decoding and empty-to-absent mapping
//!
//! # Examples
//!
//! ```
//! use feedagg::util::{decode_entities, non_empty, validate_url};
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//!
//! assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
//! assert_eq!(non_empty("   ".to_string()), None);
//! ```

mod text;
mod url_validator;

pub use text::{decode_entities, non_empty};
pub use url_validator::{validate_url, UrlValidationError};
