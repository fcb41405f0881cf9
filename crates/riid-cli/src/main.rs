fn main() {
    if let Err(err) = riid_cli::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
