fn main() {
    // Fetch the ffmpeg binary at build time so development runs have it cached.
    // At runtime the encoder falls back to the system PATH if this never ran.
    let _ = ffmpeg_sidecar::download::auto_download();
}
