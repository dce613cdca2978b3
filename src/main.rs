fn main() {
    if let Err(err) = csv_profiler::run() {
        eprintln!("error: {err:#}");
        std::process::exit(csv_profiler::error::exit_code_for(&err));
    }
}
