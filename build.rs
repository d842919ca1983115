//! Build script for hwstream-core
//!
//! This script:
//! 1. Locates FFmpeg libraries using pkg-config (only with the `ffmpeg` feature)
//! 2. Generates the C header for the shell boundary using cbindgen

use std::env;
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=src/");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");

    if env::var_os("CARGO_FEATURE_FFMPEG").is_some() {
        find_ffmpeg_libs();
    }

    generate_header(&manifest_dir, &out_dir);
}

/// Find FFmpeg libraries using pkg-config or fallback paths
fn find_ffmpeg_libs() {
    // libavutil carries the hwcontext (CUDA) API
    let libs = ["libavcodec", "libavformat", "libavutil", "libswscale"];

    let mut found_all = true;
    for lib in &libs {
        match pkg_config::Config::new()
            .atleast_version("58.0.0") // FFmpeg 6.0+
            .probe(lib)
        {
            Ok(library) => {
                println!("cargo:info=Found {} via pkg-config", lib);
                for path in &library.link_paths {
                    println!("cargo:rustc-link-search=native={}", path.display());
                }
            }
            Err(e) => {
                println!("cargo:warning=pkg-config failed for {}: {}", lib, e);
                found_all = false;
            }
        }
    }

    if !found_all {
        try_fallback_paths();
    }
}

/// Try common FFmpeg installation paths
fn try_fallback_paths() {
    let lib_paths = [
        "/usr/local/lib",
        "/usr/lib/x86_64-linux-gnu",
        "/usr/lib/aarch64-linux-gnu",
        "/opt/ffmpeg/lib",
        // CUDA-enabled custom build
        "ffmpeg-build/output/lib",
    ];

    let include_paths = ["/usr/local/include", "/usr/include", "/opt/ffmpeg/include"];

    for path in &lib_paths {
        if Path::new(path).exists() {
            println!("cargo:rustc-link-search=native={}", path);
            println!("cargo:info=Added link path: {}", path);
        }
    }

    for path in &include_paths {
        if Path::new(path).exists() {
            println!("cargo:include={}", path);
        }
    }

    println!("cargo:rustc-link-lib=dylib=avcodec");
    println!("cargo:rustc-link-lib=dylib=avformat");
    println!("cargo:rustc-link-lib=dylib=avutil");
    println!("cargo:rustc-link-lib=dylib=swscale");
}

/// Generate C header using cbindgen
fn generate_header(manifest_dir: &str, out_dir: &str) {
    let crate_dir = PathBuf::from(manifest_dir);
    let config_path = crate_dir.join("cbindgen.toml");
    let header_out = PathBuf::from(out_dir).join("hwstream.h");

    let config = if config_path.exists() {
        cbindgen::Config::from_file(&config_path).unwrap_or_default()
    } else {
        cbindgen::Config::default()
    };

    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(&header_out);
            println!("cargo:info=Generated header: {}", header_out.display());

            let include_dir = crate_dir.join("include");
            if include_dir.exists() {
                bindings.write_to_file(include_dir.join("hwstream_generated.h"));
            }
        }
        Err(e) => {
            println!("cargo:warning=cbindgen failed: {}", e);
            create_fallback_header(out_dir);
        }
    }
}

/// Create a minimal fallback header if cbindgen fails
fn create_fallback_header(out_dir: &str) {
    let header_content = r#"
#ifndef HWSTREAM_H
#define HWSTREAM_H

#include <stdint.h>
#include <stdbool.h>
#include <stddef.h>

// Note: This is a fallback header. Build with cbindgen for full API.

typedef enum {
    HwsResultSuccess = 0,
    HwsResultErrorInvalidHandle = 1,
    HwsResultErrorInvalidArgument = 2,
} HwsResult;

typedef struct {
    uint32_t queue_capacity;
    uint8_t overflow_policy;
    bool force_tcp;
    uint32_t buffer_size;
    uint64_t max_delay_us;
    bool elevated_priority;
} HwsSessionConfig;

typedef enum {
    HwsEventNone = 0,
    HwsEventFrameReady = 1,
    HwsEventError = 2,
} HwsEventKind;

typedef struct HwsPlayerHandle HwsPlayerHandle;
typedef struct HwsFrameHandle HwsFrameHandle;

typedef struct {
    HwsEventKind kind;
    const char* message;
} HwsEvent;

typedef struct {
    const uint8_t* data;
    size_t data_size;
    uint32_t width;
    uint32_t height;
    uint32_t stride;
    int64_t pts_us;
    uint64_t frame_number;
} HwsFrame;

void hws_init(void);
const char* hws_get_version(void);
const char* hws_get_last_error(void);
void hws_clear_last_error(void);

HwsPlayerHandle* hws_player_create(const HwsSessionConfig* config);
void hws_player_destroy(HwsPlayerHandle* handle);
HwsResult hws_player_play(HwsPlayerHandle* handle, const char* url);
HwsResult hws_player_stop(HwsPlayerHandle* handle);
bool hws_player_is_running(const HwsPlayerHandle* handle);
bool hws_player_poll_event(HwsPlayerHandle* handle, HwsEvent* out_event);

HwsFrameHandle* hws_player_request_image(const HwsPlayerHandle* handle, const char* id,
                                         uint32_t requested_width, uint32_t requested_height,
                                         uint32_t* out_width, uint32_t* out_height);
void hws_frame_get_data(const HwsFrameHandle* frame, HwsFrame* out_frame);
void hws_frame_release(HwsFrameHandle* frame);

#endif // HWSTREAM_H
"#;

    let header_path = PathBuf::from(out_dir).join("hwstream.h");
    std::fs::write(&header_path, header_content).expect("Failed to write fallback header");
    println!("cargo:info=Created fallback header: {}", header_path.display());
}
