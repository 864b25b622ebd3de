//! Fuzz target for the recipe grammar.
//!
//! Run with: cargo +nightly fuzz run fuzz_recipe_parser

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data)
        && let Ok(statements) = jsc_core::recipe::parse(text)
    {
        for stmt in statements {
            assert!(stmt.line >= 1);
        }
    }
});
