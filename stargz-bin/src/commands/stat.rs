use serde_json::json;

use super::{format_size, open, resolve};
use crate::error::{Error, Result};
use crate::ArchiveArgs;

pub fn run(args: &ArchiveArgs, path: &str, as_json: bool) -> Result<()> {
    let reader = open(args)?;
    let id = resolve(&reader, path)?;
    let attr = reader.get_attr(id).map_err(|source| Error::ReadArchive {
        path: args.path.clone(),
        source,
    })?;

    if as_json {
        let value = json!({
            "path": path,
            "id": id,
            "kind": attr.kind(),
            "attr": attr,
        });
        let s = serde_json::to_string_pretty(&value).map_err(Error::Serialize)?;
        println!("{}", s);
        return Ok(());
    }

    println!("Path:   {}", path);
    println!("Id:     {}", id);
    println!("Type:   {}", attr.kind());
    println!("Mode:   {} ({:o})", attr.mode, attr.mode.permissions());
    println!("Size:   {} ({} bytes)", format_size(attr.size), attr.size);
    println!("Links:  {}", attr.num_link);
    println!("Owner:  {}:{}", attr.uid, attr.gid);
    println!(
        "Modified: {}",
        attr.mod_time
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    );
    if !attr.link_name.is_empty() {
        println!("Target: {}", attr.link_name);
    }
    if attr.dev_major != 0 || attr.dev_minor != 0 {
        println!("Device: {}, {}", attr.dev_major, attr.dev_minor);
    }
    if attr.mode.is_regular() {
        if let Ok(n) = reader.num_of_chunks(id) {
            println!("Chunks: {}", n);
        }
    }
    if !attr.xattrs.is_empty() {
        println!("Xattrs:");
        for (key, value) in attr.xattrs.iter() {
            match std::str::from_utf8(value) {
                Ok(s) => println!("  {}: {}", key, s),
                Err(_) => println!("  {}: {:02x?}", key, value),
            }
        }
    }

    Ok(())
}
