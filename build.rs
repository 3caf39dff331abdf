fn main() {
    // Propagate the ESP-IDF build environment (paths, linker args) to the
    // crate.  Host-side test builds (espidf feature off) skip it.
    if std::env::var("CARGO_FEATURE_ESPIDF").is_ok() {
        embuild::espidf::sysenv::output();
    }
}
