//! Build script for rfft2-backend-cuda.
//!
//! Locates the CUDA toolkit and links libcufft and libcudart when the `cuda`
//! feature is enabled.

fn main() {
    #[cfg(feature = "cuda")]
    {
        link_cuda_libraries();
    }
}

#[cfg(feature = "cuda")]
fn link_cuda_libraries() {
    // CUDA_PATH (Windows convention), then CUDA_HOME (Linux), then the usual
    // install prefixes.
    let cuda_path = std::env::var("CUDA_PATH")
        .or_else(|_| std::env::var("CUDA_HOME"))
        .unwrap_or_else(|_| {
            ["/usr/local/cuda", "/opt/cuda", "/usr/lib/cuda"]
                .into_iter()
                .find(|path| std::path::Path::new(path).exists())
                .unwrap_or("/usr/local/cuda")
                .to_string()
        });

    let lib_path = if cfg!(target_os = "windows") {
        format!("{cuda_path}/lib/x64")
    } else {
        let lib64 = format!("{cuda_path}/lib64");
        if std::path::Path::new(&lib64).exists() {
            lib64
        } else {
            format!("{cuda_path}/lib")
        }
    };

    println!("cargo:rustc-link-search=native={lib_path}");
    println!("cargo:rustc-link-lib=cufft");
    // cudaDeviceReset lives in the runtime library.
    println!("cargo:rustc-link-lib=cudart");

    println!("cargo:rerun-if-env-changed=CUDA_PATH");
    println!("cargo:rerun-if-env-changed=CUDA_HOME");
}
