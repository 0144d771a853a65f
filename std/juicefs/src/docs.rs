//! Tuning guidance served as static text.

use jfs_mcp::{Registry, RegistryError, ToolDescriptor};

pub const WORKFLOW: &str = "
For any JuiceFS performance problem, follow these steps:
1. Find the JuiceFS mount point, using tool find_mountpoint;
2. Check the mount options of the client serving it, using tool get_mount_options;
3. Benchmark the mount point, using tool bench_in_juicefs;
4. Sample live client metrics, using tool stats_in_juicefs;
5. Sample the file system access log, using tool accesslog_in_juicefs;
";

pub const READ_AMPLIFICATION: &str = "\
Read amplification shows up as object storage download traffic far above the rate at which \
files are actually read. Analyse the access log: if reads are frequent small random reads, \
especially when the offset (the third argument of read) jumps a long way between adjacent \
calls, data fetched ahead of time is rarely used. Set --prefetch=0 to disable prefetching.";

pub const WRITE_AMPLIFICATION: &str = "
Write amplification from frequent small appends and random writes is unavoidable; it is the \
price JuiceFS pays for read and write performance. Slice compaction caused by slow sequential \
writes can be identified and reduced:
1. A large sequential write is expected to produce no fragments. Open the file system \
monitoring page and look at the object storage traffic panel.
2. If compaction traffic is high, the writer is probably producing fragments because it \
writes slowly.
3. On the client doing the writes, mount with --flush-wait=60 so data is persisted every \
60 seconds instead of every 5. This reduces the number of fragments.
";

pub const META_CACHE: &str = "
Kernel metadata cache lifetimes are set with FUSE mount options:
--attrcacheto=1
--entrycacheto=1
--direntrycacheto=1
Entry cache is built up as files are accessed. It is not a full listing, so readdir and ls \
cannot use it; only lookup is accelerated.

The same metadata is also cached in client memory, forming a kernel then client memory \
hierarchy. Client memory metadata is kept for 5 minutes by default and is actively \
invalidated, so raising the kernel lifetimes further is rarely worthwhile. Raise them only \
when the file system:
1. changes rarely, or is read-only;
2. needs a huge number of lookups, for example git status on a very large repository;
3. in practice --entrycacheto and --direntrycacheto seldom need different values. When \
directories rarely change but files change often, --direntrycacheto may exceed \
--entrycacheto.

To avoid frequent listing and lookup requests to the metadata service, the client caches \
visited files and directories in memory. Unlike the kernel cache this cache is actively \
invalidated from metadata change notifications, so it has a longer default lifetime:
--metacache            cache metadata in the client, enabled by default
--metacacheto=300      client memory metadata lifetime in seconds
--max-cached-inodes=500000  maximum number of cached inodes
";

pub const DATA_CACHE: &str = "
JuiceFS caches data at several levels: the kernel page cache, the local disk cache on the \
client machine, and the client's own read/write buffer. A read tries the page cache, then \
the readahead buffer, then the disk cache, and only goes to object storage on a miss; the \
fetched data is written back to each level asynchronously.

## Kernel page cache
Files already read are kept in the page cache, with latency as low as 10 microseconds and \
throughput of several GiB per second. Check fuse.read in juicefs stats: zero means reads \
are served by the page cache and never reach the client.

## Kernel writeback mode
FUSE writeback-cache mode lets the kernel merge frequent tiny random writes (10 to 100 \
bytes), greatly improving random write performance. It also turns sequential writes into \
random ones, which hurts sequential throughput. Enable it with -o writeback_cache.

## Client read cache
By default every block read is cached locally. On write, only data smaller than a block \
(4 MiB) is cached, because full blocks usually come from sequential writes of large files \
and are rarely read back.

### --cache-size and --free-space-ratio
Cache capacity in MiB (default 102400) and the minimum free space ratio of the cache disk \
(default 0.1). Reaching either threshold triggers eviction, which uses a 2-random policy \
that approximates LRU at lower cost.

### --cache-partial-only
Only cache blocks smaller than the block size: small files and the tail of large files. \
Use it when local disks are slower than object storage. Sequentially read blocks are then \
not cached, while small random reads (such as Parquet or ORC footers) are.

### --cache-large-write
Also cache full blocks as they are written. Off by default because sequentially written \
data is rarely read back.

## Client write cache
--writeback commits writes to the local cache directory and the metadata service, then \
uploads to object storage in the background. It has many caveats and is best enabled only \
temporarily while writing large numbers of small files.
";

pub const BUFFER_SIZE: &str = "
The read/write buffer is memory allocated to the client process, sized with --buffer-size \
(default 300 MiB). All data read or written passes through it.

## Readahead and prefetch
Data downloaded by readahead and prefetch is stored in the buffer.

## Writes
write puts data in the buffer. It is persisted on fsync, when a block (4 MiB by default) \
fills, or after it has stayed in the buffer for 5 seconds (see --flush-wait). The buffer is \
shared and writes take priority, so slow uploads congest it and can eventually make writes \
fail with flush timeouts.

## Tuning
Observe current buffer usage with juicefs stats before resizing. Besides the readahead \
window, the buffer indirectly bounds object storage request concurrency, so raising \
--max-downloads or --max-uploads alone may not help.
1. Raising --max-uploads increases block upload concurrency; raise --buffer-size as well so \
uploader threads can get memory.
2. On a low-bandwidth network, lowering --buffer-size avoids flush timeouts.
3. To speed up sequential reads, raise --buffer-size to widen the readahead window and \
--max-downloads to fetch it concurrently.
";

pub const READ_AHEAD_AND_PREFETCH: &str = "
## Readahead
On sequential reads the client reads ahead, downloading the following part of the file in \
advance. The window is the smallest of buffer-size / 5, block-size * max-downloads and \
block-size * 128 MiB. The buffer also bounds object storage concurrency, so raising \
--max-downloads or --max-uploads may require a larger buffer.

## Prefetch
When a small range of a block is read, the client downloads the whole block in the \
background. For sparse random reads with large offsets in big files this causes read \
amplification; disable it with --prefetch=0.
";

/// Register the JuiceFS tuning guides.
pub fn register_docs(registry: &mut Registry) -> Result<(), RegistryError> {
    let guides = [
        (
            "how_to_diagnosis_read_amplification",
            "What read amplification in JuiceFS is and how to reduce it",
            READ_AMPLIFICATION,
        ),
        (
            "how_to_diagnosis_write_amplification",
            "What write amplification in JuiceFS is and how to reduce it",
            WRITE_AMPLIFICATION,
        ),
        (
            "what_is_meta_cache",
            "What the metadata cache does and how to tune it",
            META_CACHE,
        ),
        (
            "what_is_data_cache",
            "What the data caches do and how to tune them, covering the kernel page cache, kernel writeback, and the client read and write caches",
            DATA_CACHE,
        ),
        (
            "what_is_read_ahead_and_prefetch",
            "What readahead and prefetch are in JuiceFS",
            READ_AHEAD_AND_PREFETCH,
        ),
        (
            "what_is_buffer_size",
            "How buffer-size affects reads and writes and how to tune it",
            BUFFER_SIZE,
        ),
    ];
    for (name, description, text) in guides {
        registry.register(ToolDescriptor::builder(name, description).text(text))?;
    }
    Ok(())
}
