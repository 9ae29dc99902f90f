use std::thread;

use diskvid::{CacheConfig, DiskCache, OpenRequest, SharedDiskCache};

const WIDTH: u32 = 512;
const HEIGHT: u32 = 96;
const THREADS: u32 = 4;

fn colour(x: u32, y: u32) -> u8 {
    (x + 3 * y) as u8
}

#[test]
fn interleaved_renderers_see_one_raster() {
    let config = CacheConfig {
        cache_max_kib: 8,
        cache_min_kib: 4,
        ..CacheConfig::default()
    };
    let cache = DiskCache::open(OpenRequest::generic(WIDTH, HEIGHT, 256), &config).unwrap();
    let shared = SharedDiskCache::new(cache);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let shared = shared.clone();
            thread::spawn(move || {
                // Each thread renders every THREADS-th row
                for y in (t..HEIGHT).step_by(THREADS as usize) {
                    shared.with(|c| {
                        for x in 0..WIDTH {
                            c.write(x, y, colour(x, y)).unwrap();
                        }
                    });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    shared.flush().unwrap();
    assert_eq!(shared.info().dirty_entries, 0);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            assert_eq!(shared.read(x, y).unwrap(), colour(x, y));
        }
    }

    let cache = match shared.into_inner() {
        Ok(cache) => cache,
        Err(_) => panic!("all renderer handles joined"),
    };
    cache.close().unwrap();
}
