fn main() {
    for (source, exported) in [("TARGET", "REGLO_BUILD_TARGET"), ("PROFILE", "REGLO_BUILD_PROFILE")] {
        if let Ok(value) = std::env::var(source) {
            println!("cargo:rustc-env={exported}={value}");
        }
        println!("cargo:rerun-if-env-changed={source}");
    }
}
