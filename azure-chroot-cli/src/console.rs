use azure_chroot::util::Ui;

/// Build progress on stdout, errors on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleUi;

impl Ui for ConsoleUi {
    fn say(&self, message: &str) {
        println!("==> {}", message);
    }

    fn message(&self, message: &str) {
        println!("    {}", message);
    }

    fn error(&self, message: &str) {
        eprintln!("==> {}", message);
    }
}
