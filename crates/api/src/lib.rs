//! dynapi HTTP handler for custom objects.
//!
//! Serves `/custom/<schema>/<version>[/<name>]`:
//!
//! ```text
//! GET    custom/<schema>/<version>         {"items": [<raw>, ...]}
//! GET    custom/<schema>/<version>/<name>  <raw>
//! POST   custom/<schema>/<version>         body echoed; keyed by body "name"
//! PUT    custom/<schema>/<version>/<name>  body echoed; keyed by path name
//! DELETE custom/<schema>/<version>/<name>  empty
//! ```
//!
//! Failures are JSON `Status` objects whose `code` matches the HTTP status line.

#![forbid(unsafe_code)]

mod extract;
mod handler;

pub use extract::{extract_custom_object, parse_custom_object};
pub use handler::{status_response, CustomObjectHandler, ObjectPath};
