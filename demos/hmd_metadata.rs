use rift_stereo::debug::SoftwareRuntime;
use rift_stereo::Eye;

fn main() {
    let context = rift_stereo::Context::initialize(SoftwareRuntime::new()).unwrap();
    let session = context.build_session().build().unwrap();
    let resolution = session.native_window_resolution();
    println!("{}x{}", resolution.width, resolution.height);

    let device = session.device().unwrap();
    println!("{}", device.description().product_name);
    for (index, fov) in device.description().default_eye_fov.iter().enumerate() {
        let eye = Eye::from_index(index).unwrap();
        let size = device.fov_texture_size(eye, *fov, 1.0);
        println!("{:?}: {:?}, {}x{}", eye, fov, size.width, size.height);
    }
}
