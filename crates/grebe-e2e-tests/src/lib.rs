//! End-to-end tests of the text-to-buffer-IR pipeline live under `tests/`.
//! This crate intentionally exports nothing.
