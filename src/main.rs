fn main() {
    if let Err(err) = tsv_sqlite_loader::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
