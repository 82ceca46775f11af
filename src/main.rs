fn main() {
    if let Err(err) = complyd::cli::run() {
        complyd::ui::eprintln_error(&err);
        std::process::exit(complyd::exit::exit_code(&err));
    }
}
