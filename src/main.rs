fn main() -> std::process::ExitCode {
    voxsplit_lib::run()
}
