use guestbook_operator::crd::render_crds;

fn main() {
    match render_crds() {
        Ok(yaml) => print!("{}", yaml),
        Err(e) => {
            eprintln!("Failed to render CRDs: {}", e);
            std::process::exit(1);
        }
    }
}
