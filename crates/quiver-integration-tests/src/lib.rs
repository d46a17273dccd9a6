//! End-to-end suites for the Quiver runtime live under `tests/`; this
//! library target is empty.

#![deny(unsafe_code)]
#![warn(missing_docs)]
