use stargz_metadata::{NodeKind, Reader};

use super::{format_size, open, resolve};
use crate::error::{Error, Result};
use crate::ArchiveArgs;

struct Row {
    path: String,
    id: u32,
}

fn walk(reader: &Reader, dir: u32, prefix: &str, out: &mut Vec<Row>) -> stargz_metadata::Result<()> {
    let mut children = vec![];
    reader.foreach_child(dir, |name, id, mode| {
        children.push((name.to_string(), id, mode.is_dir()));
        true
    })?;
    for (name, id, is_dir) in children {
        let path = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        out.push(Row {
            path: path.clone(),
            id,
        });
        if is_dir {
            walk(reader, id, &path, out)?;
        }
    }
    Ok(())
}

pub fn run(args: &ArchiveArgs, start: Option<&str>) -> Result<()> {
    let reader = open(args)?;
    let (dir, prefix) = match start {
        Some(path) => (resolve(&reader, path)?, path.trim_matches('/').to_string()),
        None => (reader.root_id(), String::new()),
    };

    let read_error = |source| Error::ReadArchive {
        path: args.path.clone(),
        source,
    };

    let mut rows = vec![];
    walk(&reader, dir, &prefix, &mut rows).map_err(read_error)?;

    println!("    Id  Mode          Links  Owner        Size        Path");
    println!("------  ----------  -------  -----------  ----------  --------");
    for row in rows {
        let attr = reader.get_attr(row.id).map_err(read_error)?;
        let size = match attr.kind() {
            NodeKind::Regular => format_size(attr.size),
            NodeKind::CharDevice | NodeKind::BlockDevice => {
                format!("{}, {}", attr.dev_major, attr.dev_minor)
            }
            _ => "-".to_string(),
        };
        let path = match attr.kind() {
            NodeKind::Symlink => format!("{} -> {}", row.path, attr.link_name),
            NodeKind::Directory => format!("{}/", row.path),
            _ => row.path,
        };
        println!(
            "{:>6}  {}  {:>7}  {:>11}  {:>10}  {}",
            row.id,
            attr.mode,
            attr.num_link,
            format!("{}:{}", attr.uid, attr.gid),
            size,
            path
        );
    }

    Ok(())
}
