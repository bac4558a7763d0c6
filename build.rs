use vergen::{BuildBuilder, Emitter};
use vergen_git2::Git2Builder;

// Embeds the commit the binary was built from; `--version` reports it.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = BuildBuilder::default().build_date(true).build()?;

    match Git2Builder::default().sha(true).dirty(true).build() {
        Ok(git2) => {
            Emitter::default()
                .add_instructions(&build)?
                .add_instructions(&git2)?
                .emit()?;
        }
        Err(_) => {
            // Source tarballs have no repository to describe.
            println!("cargo:rustc-env=VERGEN_GIT_SHA=unknown");
            println!("cargo:rustc-env=VERGEN_GIT_DIRTY=false");
            Emitter::default().add_instructions(&build)?.emit()?;
        }
    }

    Ok(())
}
