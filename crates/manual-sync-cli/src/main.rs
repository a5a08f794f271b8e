use std::process;

fn main() {
    match manual_sync_cli::run() {
        Ok(code) => process::exit(i32::from(code as u8)),
        Err(err) => {
            eprintln!("manual-sync error: {err:#}");
            process::exit(i32::from(manual_sync_cli::exit_code_for(&err) as u8));
        }
    }
}
