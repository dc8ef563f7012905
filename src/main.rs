fn main() {
    if let Err(err) = smartlab_dashboard::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
