//! Integration tests: the full wait → purchase loop against an
//! in-memory chain.

mod purchase_loop;
