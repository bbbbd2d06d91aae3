// Runs once per test binary that links this crate.
#[ctor::ctor(anonymous)]
fn init_test_logger() {
    let _ = env_logger::builder()
        .parse_env(env_logger::Env::default().default_filter_or("debug"))
        .format_level(true)
        .format_source_path(true)
        .format_module_path(false)
        .format_timestamp(None)
        // Keep log lines on stdout so panic messages on stderr stay readable
        .target(env_logger::Target::Stdout)
        .is_test(true)
        .try_init();
}
