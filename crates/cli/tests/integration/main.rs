mod build_tests;
mod common;
mod roundtrip_tests;
