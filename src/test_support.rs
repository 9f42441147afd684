// ============================================================================
// Test support: in-memory feed bundles
// ============================================================================

use bytes::Bytes;
use std::io::{Cursor, Write};
use zip::write::FileOptions;

pub fn zip_with(files: &[(&str, &str)]) -> Bytes {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in files {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    Bytes::from(writer.finish().unwrap().into_inner())
}

/// Two stations on the A Line, one weekday trip between them.
pub fn sample_feed() -> Bytes {
    zip_with(&[
        ("routes.txt", "route_id,route_short_name\n801,\n"),
        ("trips.txt", "route_id,service_id,trip_id\n801,WKDY,T1\n"),
        (
            "stops.txt",
            "stop_id,stop_name,parent_station\nA,Alpha Station,\nC,Charlie Station,\n",
        ),
        (
            "stop_times.txt",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,14:00:00,14:00:00,A,1\n\
             T1,14:40:00,14:40:00,C,2\n",
        ),
        (
            "calendar.txt",
            "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
             WKDY,1,1,1,1,1,0,0,20260101,20261231\n",
        ),
    ])
}
