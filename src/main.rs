fn main() {
    if let Err(err) = appdriver_lib::run() {
        eprintln!("appdriver: {err:#}");
        std::process::exit(1);
    }
}
