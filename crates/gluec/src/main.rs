use std::env;
use std::process;

fn main() {
    let code = gluec::cli::run(env::args().skip(1));
    process::exit(code);
}
