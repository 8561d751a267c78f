use std::path::Path;

use shelf::*;

pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Seed a small tree and bring it offline in simple mode: branch 0 holds
/// the full snapshot as revision 0.
#[allow(dead_code)]
pub fn init_workspace(dir: &Path) -> Workspace {
    init_with_options(dir, Options::default())
}

#[allow(dead_code)]
pub fn init_with_options(dir: &Path, options: Options) -> Workspace {
    let _ = env_logger::builder().is_test(true).try_init();
    write_file(dir, "a.txt", "alpha\n");
    write_file(dir, "sub/b.txt", "beta\n");
    Workspace::init(dir, options).unwrap()
}

/// Direct store handle beside a workspace, for inspecting persisted
/// records.
#[allow(dead_code)]
pub fn open_store(dir: &Path) -> Store {
    Store::new(dir.join(META_DIR), false)
}

#[allow(dead_code)]
pub fn read_text(root: &Path, rel: &str) -> String {
    String::from_utf8(std::fs::read(root.join(rel)).unwrap()).unwrap()
}
