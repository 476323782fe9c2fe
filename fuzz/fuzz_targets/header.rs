#![no_main]
#[macro_use] extern crate libfuzzer_sys;
extern crate hashfs_core;

use hashfs_core::ArchiveSrc;

fuzz_target!(|data: &[u8]| {
    let mut src = data;
    if let Ok(header) = src.read_header() {
        if let Ok(table) = src.read_entry_table(&header) {
            for entry in &table {
                let _result = src.read_content(entry);
                let _result = src.copy_content(entry, &mut std::io::sink());
            }
        }
    }
});
