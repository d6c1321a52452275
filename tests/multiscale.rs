use approx::assert_relative_eq;
use ndarray::{Array, ArrayD, IxDyn};
use zarrs::array::{ArrayMetadataV2, ChunkKeySeparator};
use zarrs::storage::store::MemoryStore;
use zarrs_hcs::Error;
use zarrs_hcs::channel::channel_histograms;
use zarrs_hcs::chunking::ChunkOptions;
use zarrs_hcs::histogram::UIntHistogram;
use zarrs_hcs::metadata::{Attributes, Omero, PhysicalCalibration, first_multiscale};
use zarrs_hcs::multiscale::MultiscaleWriter;
use zarrs_hcs::store::NgffStore;

const FIELD: &str = "C/5/0";

fn store() -> NgffStore<MemoryStore> {
    env_logger::try_init().ok();
    NgffStore::new(MemoryStore::new())
}

fn channel(name: &str, color: &str) -> Attributes {
    serde_json::json!({
        "channel-name": name,
        "display-color": color,
        "objective": "20X Plan Apo Lambda",
        "exposure-time": 15.0,
        "exposure-time-unit": "ms",
    })
    .as_object()
    .cloned()
    .expect("json object")
}

fn cyx_image() -> ArrayD<u16> {
    Array::from_shape_fn(IxDyn(&[2, 64, 48]), |idx| {
        (idx[0] * 1000 + idx[1] * 48 + idx[2]) as u16
    })
}

fn calibration() -> PhysicalCalibration {
    PhysicalCalibration::new(0.3417, 0.3417, "um")
}

fn chunk_edges(meta: &ArrayMetadataV2) -> Vec<u64> {
    meta.chunks.iter().map(|c| c.get()).collect()
}

/// Every dataset listed in the node's multiscale has an array.
fn assert_datasets_exist(store: &NgffStore<MemoryStore>, path: &str) {
    let multiscale = first_multiscale(&store.attributes(path).unwrap()).unwrap();
    for dataset in &multiscale.datasets {
        let level = format!("{path}/{}", dataset.path);
        assert!(store.array_exists(&level).unwrap(), "missing array {level:?}");
    }
}

fn small_chunks() -> ChunkOptions {
    ChunkOptions {
        max_chunk_edge: 32,
        ..Default::default()
    }
}

#[test]
fn write_cyx_image() {
    let store = store();
    let image = cyx_image();
    let hists = channel_histograms(image.view()).unwrap();
    let channels = [channel("DAPI", "0000FF"), channel("FITC", "00FF00")];

    let multiscale = MultiscaleWriter::new(&store)
        .with_options(small_chunks())
        .write_image(FIELD, image.view(), &hists, &channels, &calibration())
        .expect("write image");

    // 64x48 with 32-pixel chunks: level 0 (32, 32), level 1 (32, 24), level 2 (16, 12)
    assert_eq!(multiscale.datasets.len(), 3);
    let attrs = store.attributes(FIELD).expect("attributes");
    let written = first_multiscale(&attrs).expect("multiscales");
    assert_eq!(written, multiscale);
    let names: Vec<_> = written.axes.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["c", "y", "x"]);
    assert_eq!(written.axes[1].unit.as_deref(), Some("micrometer"));
    assert_eq!(written.datasets[0].scale(), Some([1.0, 0.3417, 0.3417].as_slice()));
    assert_eq!(written.datasets[1].scale(), Some([1.0, 2.0, 2.0].as_slice()));

    let level0 = store.array_metadata(&format!("{FIELD}/0")).unwrap().unwrap();
    assert_eq!(level0.shape, vec![2, 64, 48]);
    assert_eq!(chunk_edges(&level0), vec![1, 32, 32]);
    assert_eq!(level0.dtype.to_string(), "<u2");
    assert_eq!(level0.dimension_separator, ChunkKeySeparator::Slash);
    assert!(level0.compressor.is_none());
    let level2 = store.array_metadata(&format!("{FIELD}/2")).unwrap().unwrap();
    assert_eq!(level2.shape, vec![2, 16, 12]);
    assert_eq!(chunk_edges(&level2), vec![1, 16, 12]);

    let back: ArrayD<u16> = store.read_array(&format!("{FIELD}/0")).expect("read level 0");
    assert_eq!(back, image);

    let hist_names: Vec<String> =
        serde_json::from_value(attrs["histograms"].clone()).expect("histogram paths");
    assert_eq!(
        hist_names,
        ["C00_DAPI_histogram.npz", "C01_FITC_histogram.npz"]
    );
    for (name, hist) in hist_names.iter().zip(&hists) {
        let bytes = store
            .get_bytes(FIELD, name)
            .expect("get sidecar")
            .expect("sidecar exists");
        assert_eq!(&UIntHistogram::from_npz_bytes(&bytes).unwrap(), hist);
    }

    let omero: Omero = serde_json::from_value(attrs["omero"].clone()).expect("omero");
    assert_eq!(omero.channels.len(), 2);
    assert_eq!(omero.channels[1].label, "FITC");
    assert_eq!(omero.channels[1].wavelength_id, "C02");
    assert_eq!(omero.channels[0].window.min, 0);
    assert_eq!(omero.channels[0].window.max, 65535);
    assert_eq!(omero.channels[0].window.start, hists[0].quantile(0.01).unwrap());
    assert_eq!(omero.channels[0].window.end, hists[0].quantile(0.99).unwrap());

    assert_eq!(
        attrs["acquisition_metadata"]["channels"][0]["objective"],
        "20X Plan Apo Lambda"
    );
}

#[test]
fn write_czyx_image_calibrates_z() {
    let store = store();
    let image: ArrayD<u8> = Array::from_shape_fn(IxDyn(&[1, 3, 16, 16]), |idx| {
        (idx[1] * 16 + idx[2]) as u8
    });
    let hists = channel_histograms(image.view()).unwrap();
    let mut ch = channel("Cy5", "FF0000");
    ch.insert("z-projection-method".into(), "Maximum Intensity".into());
    let cal = calibration().with_z_positions(&[10.0, 15.0, 12.5]);

    let multiscale = MultiscaleWriter::new(&store)
        .write_image(FIELD, image.view(), &hists, &[ch], &cal)
        .expect("write image");
    let scale = multiscale.datasets[0].scale().expect("scale");
    assert_eq!(scale.len(), 4);
    assert_relative_eq!(scale[1], 2.5);
    assert_relative_eq!(scale[3], 0.3417);

    let attrs = store.attributes(FIELD).unwrap();
    let omero: Omero = serde_json::from_value(attrs["omero"].clone()).unwrap();
    assert_eq!(omero.channels[0].label, "Maximum-Intensity-Projection_Cy5");
    assert_eq!(omero.channels[0].window.max, 255);
}

#[test]
fn attributes_are_merged() {
    let store = store();
    store.create_group(FIELD).unwrap();
    let mut existing = Attributes::new();
    existing.insert("keep".into(), "me".into());
    store.set_attributes(FIELD, &existing).unwrap();

    let image = cyx_image();
    let hists = channel_histograms(image.view()).unwrap();
    let channels = [channel("DAPI", "0000FF"), channel("FITC", "00FF00")];
    MultiscaleWriter::new(&store)
        .write_image(FIELD, image.view(), &hists, &channels, &calibration())
        .unwrap();

    let attrs = store.attributes(FIELD).unwrap();
    assert_eq!(attrs["keep"], "me");
    assert!(attrs.contains_key("multiscales"));
}

#[test]
fn unsupported_unit_writes_nothing() {
    let store = store();
    let image = cyx_image();
    let hists = channel_histograms(image.view()).unwrap();
    let channels = [channel("DAPI", "0000FF"), channel("FITC", "00FF00")];
    let cal = PhysicalCalibration::new(0.3417, 0.3417, "nm");

    let err = MultiscaleWriter::new(&store)
        .write_image(FIELD, image.view(), &hists, &channels, &cal)
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedUnit(u) if u == "nm"));
    assert!(!store.group_exists(FIELD).unwrap());
}

#[test]
fn two_dimensional_image_is_rejected() {
    let store = store();
    let image = ArrayD::<u16>::ones(IxDyn(&[64, 48]));
    let hists = [UIntHistogram::from_samples([1u16]).unwrap()];
    let err = MultiscaleWriter::new(&store)
        .write_image(FIELD, image.view(), &hists, &[channel("DAPI", "0000FF")], &calibration())
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedDimensionality(2)));
    assert!(!store.group_exists(FIELD).unwrap());
}

#[test]
fn missing_channel_field_writes_nothing() {
    let store = store();
    let image = cyx_image();
    let hists = channel_histograms(image.view()).unwrap();
    let mut no_color = channel("FITC", "00FF00");
    no_color.remove("display-color");
    let channels = [channel("DAPI", "0000FF"), no_color];

    let err = MultiscaleWriter::new(&store)
        .write_image(FIELD, image.view(), &hists, &channels, &calibration())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::MissingChannelField {
            channel: 1,
            field: "display-color"
        }
    ));
    assert!(!store.group_exists(FIELD).unwrap());
}

#[test]
fn empty_histogram_writes_nothing() {
    let store = store();
    let image = cyx_image();
    let hists = [UIntHistogram::new(), UIntHistogram::new()];
    let channels = [channel("DAPI", "0000FF"), channel("FITC", "00FF00")];

    let err = MultiscaleWriter::new(&store)
        .write_image(FIELD, image.view(), &hists, &channels, &calibration())
        .unwrap_err();
    assert!(matches!(err, Error::EmptyHistogram));
    assert!(!store.group_exists(FIELD).unwrap());
}

#[test]
fn skips_empty_chunks_when_asked() {
    let store = store();
    let mut image = ArrayD::<u16>::zeros(IxDyn(&[1, 64, 64]));
    image[[0, 40, 40]] = 7;
    let options = ChunkOptions {
        max_chunk_edge: 32,
        max_levels: 0,
        write_empty_chunks: false,
    };
    let hists = channel_histograms(image.view()).unwrap();
    MultiscaleWriter::new(&store)
        .with_options(options)
        .write_image(
            FIELD,
            image.view(),
            &hists,
            &[channel("DAPI", "0000FF")],
            &calibration(),
        )
        .unwrap();

    let level0 = format!("{FIELD}/0");
    assert!(store.get_bytes(&level0, "0/0/0").unwrap().is_none());
    assert!(store.get_bytes(&level0, "0/1/1").unwrap().is_some());
    let back: ArrayD<u16> = store.read_array(&level0).unwrap();
    assert_eq!(back, image);
}

#[test]
fn labels_reuse_parent_axes() {
    let store = store();
    let image = cyx_image();
    let hists = channel_histograms(image.view()).unwrap();
    let channels = [channel("DAPI", "0000FF"), channel("FITC", "00FF00")];
    let writer = MultiscaleWriter::new(&store).with_options(small_chunks());
    let parent = writer
        .write_image(FIELD, image.view(), &hists, &channels, &calibration())
        .unwrap();

    let labels: ArrayD<u32> = Array::from_shape_fn(IxDyn(&[1, 64, 48]), |idx| {
        u32::from(idx[1] >= 32) + 1
    });
    let written = writer
        .write_labels(FIELD, "nuclei", labels.view(), false)
        .expect("write labels");
    assert_eq!(written.axes, parent.axes);

    let label_path = format!("{FIELD}/labels/nuclei");
    let attrs = store.attributes(&label_path).unwrap();
    assert_eq!(first_multiscale(&attrs).unwrap(), parent);
    assert!(attrs.contains_key("image-label"));
    let back: ArrayD<u32> = store.read_array(&format!("{label_path}/0")).unwrap();
    assert_eq!(back, labels);

    // re-invoking reuses the group
    writer
        .write_labels(FIELD, "nuclei", labels.view(), false)
        .expect("rewrite labels");
    let listing = store.attributes(&format!("{FIELD}/labels")).unwrap();
    assert_eq!(listing["labels"], serde_json::json!(["nuclei"]));
}

#[test]
fn labels_overwrite_erases_previous_levels() {
    let store = store();
    let image = cyx_image();
    let hists = channel_histograms(image.view()).unwrap();
    let channels = [channel("DAPI", "0000FF"), channel("FITC", "00FF00")];
    let writer = MultiscaleWriter::new(&store).with_options(small_chunks());
    writer
        .write_image(FIELD, image.view(), &hists, &channels, &calibration())
        .unwrap();

    let labels = ArrayD::<u32>::ones(IxDyn(&[1, 64, 48]));
    writer
        .write_labels(FIELD, "cells", labels.view(), false)
        .unwrap();
    let label_path = format!("{FIELD}/labels/cells");
    assert!(store.array_exists(&format!("{label_path}/2")).unwrap());

    let small = ArrayD::<u32>::ones(IxDyn(&[1, 16, 16]));
    let written = writer
        .write_labels(FIELD, "cells", small.view(), true)
        .unwrap();
    assert_eq!(written.datasets.len(), 1);
    assert!(store.array_exists(&format!("{label_path}/0")).unwrap());
    assert!(!store.array_exists(&format!("{label_path}/2")).unwrap());
    assert_datasets_exist(&store, &label_path);
}

#[test]
fn smaller_labels_list_their_own_levels() {
    let store = store();
    let image = cyx_image();
    let hists = channel_histograms(image.view()).unwrap();
    let channels = [channel("DAPI", "0000FF"), channel("FITC", "00FF00")];
    let writer = MultiscaleWriter::new(&store).with_options(small_chunks());
    let parent = writer
        .write_image(FIELD, image.view(), &hists, &channels, &calibration())
        .unwrap();
    assert_eq!(parent.datasets.len(), 3);

    let labels = ArrayD::<u32>::ones(IxDyn(&[1, 16, 16]));
    let written = writer
        .write_labels(FIELD, "spots", labels.view(), false)
        .unwrap();
    assert_eq!(written.axes, parent.axes);
    assert_eq!(written.datasets.len(), 1);
    assert_eq!(written.datasets[0].scale(), parent.datasets[0].scale());

    let label_path = format!("{FIELD}/labels/spots");
    assert_eq!(
        first_multiscale(&store.attributes(&label_path).unwrap()).unwrap(),
        written
    );
    assert_datasets_exist(&store, &label_path);
}

#[test]
fn rewriting_labels_with_zeros_clears_old_chunks() {
    let store = store();
    let image = cyx_image();
    let hists = channel_histograms(image.view()).unwrap();
    let channels = [channel("DAPI", "0000FF"), channel("FITC", "00FF00")];
    let options = ChunkOptions {
        max_chunk_edge: 32,
        max_levels: 0,
        write_empty_chunks: false,
    };
    let writer = MultiscaleWriter::new(&store).with_options(options);
    writer
        .write_image(FIELD, image.view(), &hists, &channels, &calibration())
        .unwrap();

    let label_level = format!("{FIELD}/labels/nuclei/0");
    let first = ArrayD::<u32>::from_elem(IxDyn(&[1, 64, 48]), 7);
    writer
        .write_labels(FIELD, "nuclei", first.view(), false)
        .unwrap();
    assert!(store.get_bytes(&label_level, "0/1/1").unwrap().is_some());

    let second = ArrayD::<u32>::zeros(IxDyn(&[1, 64, 48]));
    writer
        .write_labels(FIELD, "nuclei", second.view(), false)
        .unwrap();
    assert!(store.get_bytes(&label_level, "0/1/1").unwrap().is_none());
    let back: ArrayD<u32> = store.read_array(&label_level).unwrap();
    assert_eq!(back, second);
}

#[test]
fn labels_with_wrong_dimensionality_are_rejected() {
    let store = store();
    let image = cyx_image();
    let hists = channel_histograms(image.view()).unwrap();
    let channels = [channel("DAPI", "0000FF"), channel("FITC", "00FF00")];
    let writer = MultiscaleWriter::new(&store);
    writer
        .write_image(FIELD, image.view(), &hists, &channels, &calibration())
        .unwrap();

    let labels = ArrayD::<u32>::zeros(IxDyn(&[64, 48]));
    let err = writer
        .write_labels(FIELD, "nuclei", labels.view(), false)
        .unwrap_err();
    assert!(matches!(err, Error::AxisMismatch { axes: 3, ndim: 2 }));
    assert!(!store.group_exists(&format!("{FIELD}/labels/nuclei")).unwrap());
}
