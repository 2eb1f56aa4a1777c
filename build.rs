fn main() {
    #[cfg(feature = "tauri-shell")]
    tauri_build::build()
}
