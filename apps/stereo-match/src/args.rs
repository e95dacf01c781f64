use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser, ValueEnum};
use rgbd_camera::stereo::{Algorithm, MAX_BLOCK_SIZE, MAX_NUM_DISPARITIES};
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CameraKind {
    /// Generic UVC webcams polled in the background
    Uvc,
    /// IDS uEye industrial cameras
    Ueye,
    /// Synthetic frames, no hardware needed
    Mock,
}

/// Demo stereo matching converting left and right frames into disparity and point clouds
#[derive(Parser, Debug, Clone)]
#[command(name = "stereo-match", version)]
pub struct Args {
    /// Left image (frames come from the live cameras; accepted for compatibility)
    pub left_image: Option<PathBuf>,
    /// Right image (accepted for compatibility)
    pub right_image: Option<PathBuf>,

    /// Stereo correspondence algorithm: bm, sgbm, hh or var
    #[arg(long, default_value_t = Algorithm::Sgbm)]
    pub algorithm: Algorithm,
    /// Disparity search range; positive and divisible by 16
    #[arg(long, value_name = "N", value_parser = parse_max_disparity)]
    pub max_disparity: Option<u32>,
    /// Matching block size; positive and odd
    #[arg(long, value_name = "N", value_parser = parse_block_size)]
    pub blocksize: Option<u32>,
    /// Scale factor (accepted, has no effect)
    #[arg(long, value_name = "F")]
    pub scale: Option<f64>,
    /// Do not open preview windows
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_display: bool,

    /// Intrinsic calibration file (M1, D1, M2, D2)
    #[arg(short = 'i', value_name = "INTRINSICS")]
    pub intrinsics: Option<PathBuf>,
    /// Extrinsic calibration file (R, T, V1, V2)
    #[arg(short = 'e', value_name = "EXTRINSICS")]
    pub extrinsics: Option<PathBuf>,
    /// Write the last disparity image here on exit
    #[arg(short = 'o', value_name = "DISPARITY_IMAGE")]
    pub disparity_output: Option<PathBuf>,
    /// Write the last point cloud (PLY) here on exit
    #[arg(short = 'p', value_name = "POINT_CLOUD")]
    pub point_cloud_output: Option<PathBuf>,

    /// Camera backend
    #[arg(long, value_enum, default_value_t = CameraKind::Ueye)]
    pub camera: CameraKind,
    /// Left camera device id
    #[arg(long, default_value_t = 1)]
    pub left_device: i32,
    /// Right camera device id
    #[arg(long, default_value_t = 2)]
    pub right_device: i32,
    /// uEye parameter file shared by both cameras
    #[arg(long, value_name = "INI", default_value = "data/ueye/ueye-conf-half.ini")]
    pub ueye_config: PathBuf,
    /// Frame width in pixels
    #[arg(long, default_value_t = 640, value_parser = clap::value_parser!(u32).range(1..))]
    pub width: u32,
    /// Frame height in pixels
    #[arg(long, default_value_t = 480, value_parser = clap::value_parser!(u32).range(1..))]
    pub height: u32,
    /// Capture rate requested from the cameras
    #[arg(long, default_value_t = 60.0, value_parser = parse_positive)]
    pub fps: f64,
    /// Points farther than this (in calibration units) are dropped
    #[arg(long, default_value_t = 1.0, value_parser = parse_positive)]
    pub max_depth: f64,
    /// Stop after this many frames (0 runs until Escape or Ctrl-C)
    #[arg(long, default_value_t = 0)]
    pub frames: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ArgError {
    /// Help or version output was requested.
    #[error("{0}")]
    Help(String),
    #[error("Command-line parameter error: {0}")]
    Invalid(String),
}

impl ArgError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ArgError::Help(_) => 0,
            ArgError::Invalid(_) => -1,
        }
    }
}

pub fn usage() -> String {
    Args::command().render_usage().to_string()
}

/// Parse and cross-check the command line (`args` includes the program name).
///
/// No arguments at all prints help, as does `-h`/`--help`.
pub fn parse<I, T>(args: I) -> Result<Args, ArgError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    if args.len() <= 1 {
        return Err(ArgError::Help(Args::command().render_help().to_string()));
    }
    let parsed = Args::try_parse_from(&args).map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ArgError::Help(e.to_string()),
        _ => {
            let rendered = e.render().to_string();
            let first = rendered.lines().next().unwrap_or_default();
            ArgError::Invalid(first.trim_start_matches("error: ").to_string())
        }
    })?;
    parsed.validate()?;
    Ok(parsed)
}

impl Args {
    fn validate(&self) -> Result<(), ArgError> {
        if self.intrinsics.is_some() != self.extrinsics.is_some() {
            return Err(ArgError::Invalid(
                "either both intrinsic and extrinsic parameters must be specified, \
                 or none of them (when the stereo pair is already rectified)"
                    .into(),
            ));
        }
        if self.point_cloud_output.is_some() && self.intrinsics.is_none() {
            return Err(ArgError::Invalid(
                "extrinsic and intrinsic parameters must be specified to compute the point cloud"
                    .into(),
            ));
        }
        Ok(())
    }

    pub fn is_calibrated(&self) -> bool {
        self.intrinsics.is_some() && self.extrinsics.is_some()
    }
}

fn parse_max_disparity(s: &str) -> Result<u32, String> {
    match s.parse::<u32>() {
        Ok(n) if n > 0 && n % 16 == 0 && n <= MAX_NUM_DISPARITIES => Ok(n),
        _ => Err(format!(
            "The max disparity (--max-disparity=<...>) must be a positive integer divisible by 16, at most {MAX_NUM_DISPARITIES}"
        )),
    }
}

fn parse_block_size(s: &str) -> Result<u32, String> {
    match s.parse::<u32>() {
        Ok(n) if n % 2 == 1 && n <= MAX_BLOCK_SIZE => Ok(n),
        _ => Err(format!(
            "The block size (--blocksize=<...>) must be a positive odd number, at most {MAX_BLOCK_SIZE}"
        )),
    }
}

fn parse_positive(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(format!("expected a positive number, got '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: &[&str]) -> Result<Args, ArgError> {
        parse(std::iter::once("stereo-match").chain(args.iter().copied()))
    }

    fn exit_code(args: &[&str]) -> i32 {
        match run(args) {
            Ok(_) => 0,
            Err(e) => e.exit_code(),
        }
    }

    #[test]
    fn test_sgbm_scenario_parses() {
        let args = run(&[
            "--algorithm=sgbm",
            "--max-disparity=64",
            "--blocksize=9",
            "-i",
            "intr.yml",
            "-e",
            "extr.yml",
        ])
        .unwrap();
        assert_eq!(args.algorithm, Algorithm::Sgbm);
        assert_eq!(args.max_disparity, Some(64));
        assert_eq!(args.blocksize, Some(9));
        assert!(args.is_calibrated());
        assert_eq!(args.intrinsics.as_deref(), Some(std::path::Path::new("intr.yml")));

        let params = rgbd_camera::stereo::MatcherParams::derive(
            args.algorithm,
            args.max_disparity,
            args.blocksize,
            args.width,
            3,
        );
        match params {
            rgbd_camera::stereo::MatcherParams::Sgbm(p) => {
                assert_eq!(p.num_disparities, 64);
                assert_eq!(p.block_size, 9);
                assert!(!p.full_dp);
            }
            other => panic!("expected SGBM, got {other:?}"),
        }
    }

    #[test]
    fn test_max_disparity_not_multiple_of_16() {
        let err = run(&["--max-disparity=50"]).unwrap_err();
        assert_eq!(err.exit_code(), -1);
        assert!(err.to_string().contains("divisible by 16"), "{err}");
    }

    #[test]
    fn test_intrinsics_without_extrinsics() {
        assert_eq!(exit_code(&["-i", "intr.yml"]), -1);
        assert_eq!(exit_code(&["-e", "extr.yml"]), -1);
    }

    #[test]
    fn test_point_cloud_requires_calibration() {
        assert_eq!(exit_code(&["-p", "cloud.ply"]), -1);
        assert_eq!(exit_code(&["-p", "cloud.ply", "-i", "a.yml", "-e", "b.yml"]), 0);
    }

    #[test]
    fn test_max_disparity_property() {
        for d in -40i32..=300 {
            let arg = format!("--max-disparity={d}");
            let ok = d > 0 && d % 16 == 0;
            assert_eq!(exit_code(&[arg.as_str()]) == 0, ok, "{arg}");
        }
        assert_eq!(exit_code(&["--max-disparity=abc"]), -1);
        assert_eq!(exit_code(&["--max-disparity=16.0"]), -1);
    }

    #[test]
    fn test_blocksize_property() {
        for b in -10i32..=40 {
            let arg = format!("--blocksize={b}");
            let ok = b > 0 && b % 2 == 1;
            assert_eq!(exit_code(&[arg.as_str()]) == 0, ok, "{arg}");
        }
    }

    #[test]
    fn test_oversized_matcher_values_rejected() {
        let cases: [&[&str]; 4] = [
            &["--blocksize=100001"],
            &["--blocksize=257"],
            &["--max-disparity=16400"],
            &["--algorithm=var", "--max-disparity=2147483648"],
        ];
        for args in cases {
            let err = run(args).unwrap_err();
            assert_eq!(err.exit_code(), -1, "{args:?}");
            assert!(err.to_string().contains("at most"), "{err}");
        }
        let args = run(&["--blocksize=255", "--max-disparity=16384"]).unwrap();
        assert_eq!((args.blocksize, args.max_disparity), (Some(255), Some(16384)));
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let err = run(&["--algorithm=census"]).unwrap_err();
        assert_eq!(err.exit_code(), -1);
        for alg in ["bm", "sgbm", "hh", "var"] {
            let args = run(&[format!("--algorithm={alg}").as_str()]).unwrap();
            assert_eq!(args.algorithm.as_str(), alg);
        }
    }

    #[test]
    fn test_help_exits_zero() {
        assert_eq!(run(&[]).unwrap_err().exit_code(), 0);
        assert_eq!(run(&["--help"]).unwrap_err().exit_code(), 0);
        assert_eq!(run(&["-h"]).unwrap_err().exit_code(), 0);
    }

    #[test]
    fn test_unknown_option_rejected() {
        assert_eq!(exit_code(&["--bogus"]), -1);
    }

    #[test]
    fn test_defaults_and_extras() {
        let args = run(&["left.png", "right.png", "--scale=0.5", "--no-display"]).unwrap();
        assert_eq!(args.algorithm, Algorithm::Sgbm);
        assert_eq!(args.camera, CameraKind::Ueye);
        assert_eq!((args.left_device, args.right_device), (1, 2));
        assert_eq!((args.width, args.height), (640, 480));
        assert_eq!(args.max_depth, 1.0);
        assert_eq!(args.scale, Some(0.5));
        assert!(args.no_display);
        assert!(!args.is_calibrated());

        let args = run(&["--camera=mock", "--frames=3", "--max-depth=2.5"]).unwrap();
        assert_eq!(args.camera, CameraKind::Mock);
        assert_eq!(args.frames, 3);
        assert_eq!(args.max_depth, 2.5);
        assert_eq!(exit_code(&["--width=0"]), -1);
        assert_eq!(exit_code(&["--fps=-1"]), -1);
    }
}
