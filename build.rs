// Embeds version info into the Windows executable

#[cfg(windows)]
fn main() {
    let mut res = winres::WindowsResource::new();
    res.set("ProductName", "Image Shrinker");
    res.set("FileDescription", "Batch image resizer and JPEG/WebP converter");
    if let Err(e) = res.compile() {
        println!("cargo:warning=could not embed Windows resources: {}", e);
    }
}

#[cfg(not(windows))]
fn main() {}
