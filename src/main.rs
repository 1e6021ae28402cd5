fn main() {
    appkg::run_cli();
}
