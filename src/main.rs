//! Thin CLI entry point. All logic lives in the `cairn` library crate.

fn main() {
    match cairn::run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("cairn: {e}");
            std::process::exit(1);
        }
    }
}
