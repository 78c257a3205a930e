fn main() {
    if let Err(e) = brrtgate::cli::run_cli() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
