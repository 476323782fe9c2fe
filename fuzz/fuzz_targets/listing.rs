#![no_main]
#[macro_use] extern crate libfuzzer_sys;
extern crate hashfs_core;

use hashfs_core::{decode_listing, Version};

fuzz_target!(|data: &[u8]| {
    let _result = decode_listing(Version::V1, data);
    let _result = decode_listing(Version::V2, data);
});
